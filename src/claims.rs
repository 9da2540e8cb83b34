use crate::chunker::{Direction, chunks};
use crate::error::ScanError;
use crate::retry::RetryingFetcher;
use crate::source::ClaimsSource;
use crate::types::{BlockRange, ClaimEvent, EventFilter};
use futures::stream::{self, Stream, StreamExt};

/// Claims discovered in one claim sub-range, in ascending block order.
#[derive(Debug, Clone)]
pub struct ClaimBatch {
    pub range: BlockRange,
    pub claims: Vec<ClaimEvent>,
}

pub struct ClaimScanner<'a, C: ?Sized> {
    source: &'a C,
    fetcher: &'a RetryingFetcher,
}

impl<'a, C: ClaimsSource + ?Sized> ClaimScanner<'a, C> {
    pub fn new(source: &'a C, fetcher: &'a RetryingFetcher) -> Self {
        Self { source, fetcher }
    }

    /// Lazily scan `range` for claims, one sub-range of `chunk_size` blocks
    /// at a time. Sub-range N+1 is only queried once N has been consumed.
    pub fn scan(
        &self,
        range: BlockRange,
        chunk_size: u64,
    ) -> Result<impl Stream<Item = Result<ClaimBatch, ScanError>> + use<'a, C>, ScanError> {
        let source = self.source;
        let fetcher = self.fetcher;
        let sub_ranges = chunks(range, chunk_size, Direction::Ascending)?;

        Ok(stream::iter(sub_ranges).then(move |sub_range| async move {
            let mut claims = fetcher
                .fetch(&EventFilter::Claims, sub_range, || {
                    source.query_claims(sub_range)
                })
                .await?;
            claims.sort_by_key(|c| (c.block_number, c.log_index));
            Ok(ClaimBatch {
                range: sub_range,
                claims,
            })
        }))
    }
}
