use crate::chunker::{Direction, chunks};
use crate::error::ScanError;
use crate::retry::RetryingFetcher;
use crate::source::ActivitySource;
use crate::types::{ActivityEvent, BlockRange, EventFilter, Role};
use alloy_primitives::Address;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyMode {
    /// Stop at the first matching event; skip the buyer check once a sale is found.
    ShortCircuit,
    /// Scan both roles over the full window so counts and totals are complete.
    Exhaustive,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// First block of the marketplace window.
    pub activity_start: u64,
    /// Last block (inclusive) at which activity still counts.
    pub cutoff: u64,
    pub chunk_size: u64,
    /// Try one unchunked buyer query over the whole window before chunking.
    pub wide_buyer_query: bool,
    pub mode: ClassifyMode,
}

/// Marketplace activity found for one wallet before the cutoff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityReport {
    pub has_buy: bool,
    pub buy_events: Vec<ActivityEvent>,
    pub has_sell: bool,
    pub sell_events: Vec<ActivityEvent>,
}

impl ActivityReport {
    pub fn is_suspicious(&self) -> bool {
        !self.has_buy && !self.has_sell
    }
}

pub struct ActivityClassifier<'a, A: ?Sized> {
    source: &'a A,
    fetcher: &'a RetryingFetcher,
    settings: ClassifierSettings,
    window: BlockRange,
}

impl<'a, A: ActivitySource + ?Sized> ActivityClassifier<'a, A> {
    pub fn new(
        source: &'a A,
        fetcher: &'a RetryingFetcher,
        settings: ClassifierSettings,
    ) -> Result<Self, ScanError> {
        if settings.chunk_size == 0 {
            return Err(ScanError::invalid("activity chunk size must be greater than zero"));
        }
        let window = BlockRange::new(settings.activity_start, settings.cutoff)?;

        Ok(Self {
            source,
            fetcher,
            settings,
            window,
        })
    }

    pub fn window(&self) -> BlockRange {
        self.window
    }

    /// Look for sell, then buy activity of `wallet` in `[activity_start, cutoff]`.
    pub async fn classify(&self, wallet: Address) -> Result<ActivityReport, ScanError> {
        let stop_early = self.settings.mode == ClassifyMode::ShortCircuit;

        let sell_events = self.scan_role(Role::Seller, wallet, stop_early).await?;
        if stop_early && !sell_events.is_empty() {
            debug!(%wallet, "has sales, skipping buyer check");
            return Ok(ActivityReport {
                has_sell: true,
                sell_events,
                ..Default::default()
            });
        }

        let buy_events = self.scan_buyer(wallet, stop_early).await?;

        Ok(ActivityReport {
            has_buy: !buy_events.is_empty(),
            buy_events,
            has_sell: !sell_events.is_empty(),
            sell_events,
        })
    }

    async fn scan_buyer(&self, wallet: Address, stop_early: bool) -> Result<Vec<ActivityEvent>, ScanError> {
        if self.settings.wide_buyer_query {
            self.fetcher.stats().record_attempt();
            match self
                .source
                .query_orders_matched(Role::Buyer, wallet, self.window)
                .await
            {
                Ok(events) => return Ok(events),
                Err(e) => {
                    self.fetcher.stats().record_failure();
                    warn!(
                        %wallet,
                        range = %self.window,
                        error = %e,
                        "wide buyer query failed, falling back to chunked scan"
                    );
                }
            }
        }

        self.scan_role(Role::Buyer, wallet, stop_early).await
    }

    /// Walk the window from the cutoff backwards, most recent activity first.
    async fn scan_role(
        &self,
        role: Role,
        wallet: Address,
        stop_early: bool,
    ) -> Result<Vec<ActivityEvent>, ScanError> {
        let filter = EventFilter::Activity { role, wallet };
        let mut found = Vec::new();

        for sub_range in chunks(self.window, self.settings.chunk_size, Direction::Descending)? {
            let events = self
                .fetcher
                .fetch(&filter, sub_range, || {
                    self.source.query_orders_matched(role, wallet, sub_range)
                })
                .await?;
            found.extend(events);

            if stop_early && !found.is_empty() {
                break;
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockChain, ether, fast_fetcher, wallet};

    fn settings(mode: ClassifyMode) -> ClassifierSettings {
        ClassifierSettings {
            activity_start: 1_000,
            cutoff: 10_000,
            chunk_size: 1_000,
            wide_buyer_query: false,
            mode,
        }
    }

    #[tokio::test]
    async fn test_seller_activity_skips_buyer_branch() {
        let chain = MockChain::new().with_activity(wallet(0xaa), Role::Seller, 9_500, ether(5));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.has_sell);
        assert!(!report.has_buy);
        assert!(!report.is_suspicious());
        assert_eq!(chain.activity_queries(Role::Buyer), 0);
        // the sale sits in the first (most recent) chunk
        assert_eq!(chain.activity_queries(Role::Seller), 1);
    }

    #[tokio::test]
    async fn test_buyer_activity_exonerates() {
        let chain = MockChain::new().with_activity(wallet(0xaa), Role::Buyer, 1_500, ether(1));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.has_buy);
        assert!(!report.has_sell);
        assert_eq!(report.buy_events.len(), 1);
        // every seller chunk, then the buyer walk stops at [1001, 2000]
        assert_eq!(chain.activity_queries(Role::Seller), 10);
        assert_eq!(chain.activity_queries(Role::Buyer), 9);
    }

    #[tokio::test]
    async fn test_no_activity_is_suspicious() {
        let chain = MockChain::new().with_activity(wallet(0xbb), Role::Buyer, 2_000, ether(1));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.is_suspicious());
    }

    #[tokio::test]
    async fn test_activity_after_cutoff_is_ignored() {
        let chain = MockChain::new()
            .with_activity(wallet(0xaa), Role::Seller, 10_001, ether(1))
            .with_activity(wallet(0xaa), Role::Buyer, 999, ether(1));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.is_suspicious());
        assert!(chain.max_queried_block() <= 10_000);
    }

    #[tokio::test]
    async fn test_activity_at_cutoff_counts() {
        let chain = MockChain::new().with_activity(wallet(0xaa), Role::Buyer, 10_000, ether(1));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        assert!(!classifier.classify(wallet(0xaa)).await.unwrap().is_suspicious());
    }

    #[tokio::test]
    async fn test_exhaustive_mode_collects_both_roles() {
        let chain = MockChain::new()
            .with_activity(wallet(0xaa), Role::Seller, 9_000, ether(5))
            .with_activity(wallet(0xaa), Role::Seller, 2_000, ether(3))
            .with_activity(wallet(0xaa), Role::Buyer, 4_000, ether(2));
        let fetcher = fast_fetcher(3);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::Exhaustive)).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.has_sell && report.has_buy);
        assert_eq!(report.sell_events.len(), 2);
        assert_eq!(report.buy_events.len(), 1);
        assert_eq!(chain.activity_queries(Role::Seller), 10);
        assert_eq!(chain.activity_queries(Role::Buyer), 10);
    }

    #[tokio::test]
    async fn test_wide_buyer_query_is_tried_first() {
        let chain = MockChain::new().with_activity(wallet(0xaa), Role::Buyer, 1_200, ether(1));
        let fetcher = fast_fetcher(3);
        let mut settings = settings(ClassifyMode::ShortCircuit);
        settings.wide_buyer_query = true;
        let classifier = ActivityClassifier::new(&chain, &fetcher, settings).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.has_buy);
        assert_eq!(chain.activity_queries(Role::Buyer), 1);
    }

    #[tokio::test]
    async fn test_wide_buyer_query_falls_back_to_chunks() {
        let chain = MockChain::new()
            .with_max_range(1_000)
            .with_activity(wallet(0xaa), Role::Buyer, 1_200, ether(1));
        let fetcher = fast_fetcher(3);
        let mut settings = settings(ClassifyMode::ShortCircuit);
        settings.wide_buyer_query = true;
        let classifier = ActivityClassifier::new(&chain, &fetcher, settings).unwrap();

        let report = classifier.classify(wallet(0xaa)).await.unwrap();

        assert!(report.has_buy);
        // one refused wide query, then nine chunks down to [1001, 2000]
        assert_eq!(chain.activity_queries(Role::Buyer), 10);
        assert_eq!(fetcher.stats().snapshot().transient_failures, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_propagate() {
        let chain = MockChain::new().failing_wallet(wallet(0xaa), u32::MAX);
        let fetcher = fast_fetcher(2);
        let classifier =
            ActivityClassifier::new(&chain, &fetcher, settings(ClassifyMode::ShortCircuit)).unwrap();

        let err = classifier.classify(wallet(0xaa)).await.unwrap_err();

        assert!(matches!(err, ScanError::ExhaustedRetries { attempts: 2, .. }));
    }

    #[test]
    fn test_invalid_window_is_rejected() {
        let chain = MockChain::new();
        let fetcher = fast_fetcher(1);
        let mut bad = settings(ClassifyMode::ShortCircuit);
        bad.activity_start = 20_000;
        assert!(ActivityClassifier::new(&chain, &fetcher, bad).is_err());

        let mut bad = settings(ClassifyMode::ShortCircuit);
        bad.chunk_size = 0;
        assert!(ActivityClassifier::new(&chain, &fetcher, bad).is_err());
    }
}
