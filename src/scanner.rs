use crate::claims::ClaimScanner;
use crate::classifier::{ActivityClassifier, ClassifierSettings, ClassifyMode};
use crate::error::{ScanError, SinkError};
use crate::retry::{FetchStatsSnapshot, RetryingFetcher};
use crate::shutdown::Shutdown;
use crate::sink_worker::{SinkWriter, VerdictBatch, VerdictSink};
use crate::source::{ActivitySource, ChainHead, ClaimsSource};
use crate::types::{BlockRange, ClaimEvent, FailedClassification, WalletVerdict};
use futures::future;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Verdict batches that may queue up before the scan waits on the sink.
const SINK_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBlock {
    Fixed(u64),
    /// Chain head, read once when the scan starts.
    Head,
}

impl FromStr for EndBlock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "head" | "latest" => Ok(EndBlock::Head),
            other => other
                .parse()
                .map(EndBlock::Fixed)
                .map_err(|_| format!("Invalid end block: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Only suspicious claimants reach the sink.
    Suspicious,
    /// Every claimant reaches the sink with buy/sell counts and totals.
    Enriched,
}

impl ReportMode {
    pub fn classify_mode(self) -> ClassifyMode {
        match self {
            ReportMode::Suspicious => ClassifyMode::ShortCircuit,
            ReportMode::Enriched => ClassifyMode::Exhaustive,
        }
    }
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suspicious" => Ok(ReportMode::Suspicious),
            "enriched" => Ok(ReportMode::Enriched),
            other => Err(format!("Unknown report mode: {other}")),
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportMode::Suspicious => write!(f, "suspicious"),
            ReportMode::Enriched => write!(f, "enriched"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub start_block: u64,
    pub end_block: EndBlock,
    pub claim_chunk_size: u64,
    /// Maximum number of wallets classified at once.
    pub concurrency: usize,
    pub report_mode: ReportMode,
    /// How long in-flight classifications may keep running after cancellation.
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub range: BlockRange,
    pub claim_ranges: u64,
    pub claims: u64,
    pub classified: u64,
    pub suspicious: u64,
    pub failed: Vec<FailedClassification>,
    pub records_written: u64,
    pub cancelled: bool,
    pub fetch: FetchStatsSnapshot,
}

impl ScanSummary {
    fn new(range: BlockRange) -> Self {
        Self {
            range,
            claim_ranges: 0,
            claims: 0,
            classified: 0,
            suspicious: 0,
            failed: Vec::new(),
            records_written: 0,
            cancelled: false,
            fetch: FetchStatsSnapshot::default(),
        }
    }
}

#[derive(Default)]
struct BatchOutcome {
    verdicts: Vec<WalletVerdict>,
    failures: Vec<FailedClassification>,
    complete: bool,
}

/// Drives claim discovery and fans classification out per claim sub-range.
pub struct Scanner<C: ?Sized, A: ?Sized> {
    claims: Arc<C>,
    activity: Arc<A>,
    fetcher: RetryingFetcher,
    settings: ScanSettings,
    classifier: ClassifierSettings,
}

impl<C, A> Scanner<C, A>
where
    C: ClaimsSource + ChainHead + ?Sized,
    A: ActivitySource + ?Sized,
{
    /// The classifier's mode follows `settings.report_mode`.
    pub fn new(
        claims: Arc<C>,
        activity: Arc<A>,
        fetcher: RetryingFetcher,
        settings: ScanSettings,
        mut classifier: ClassifierSettings,
    ) -> Result<Self, ScanError> {
        if settings.concurrency == 0 {
            return Err(ScanError::invalid("concurrency must be greater than zero"));
        }
        if settings.claim_chunk_size == 0 {
            return Err(ScanError::invalid("claim chunk size must be greater than zero"));
        }
        classifier.mode = settings.report_mode.classify_mode();

        Ok(Scanner {
            claims,
            activity,
            fetcher,
            settings,
            classifier,
        })
    }

    pub async fn run<S: VerdictSink>(&self, sink: S, shutdown: Shutdown) -> Result<ScanSummary, ScanError> {
        let range = self.resolve_range().await?;
        info!(
            "Scanning claims in blocks {} ({} blocks per query, {} concurrent classifications, {} report)",
            range, self.settings.claim_chunk_size, self.settings.concurrency, self.settings.report_mode
        );

        let (writer, worker) = SinkWriter::spawn(sink, SINK_QUEUE_DEPTH);
        let mut summary = ScanSummary::new(range);
        let scanned = self.scan(range, &writer, &shutdown, &mut summary).await;

        drop(writer);
        let flushed = worker
            .await
            .map_err(|e| SinkError::WorkerGone(e.to_string()))?;
        summary.fetch = self.fetcher.stats().snapshot();

        match (scanned, flushed) {
            (_, Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => {
                error!(
                    "Scan aborted after {} claim range(s): {}",
                    summary.claim_ranges, e
                );
                Err(e)
            }
            (Ok(()), Ok(written)) => {
                summary.records_written = written;
                Ok(summary)
            }
        }
    }

    /// Resolve the scan range. A head end block is read exactly once.
    async fn resolve_range(&self) -> Result<BlockRange, ScanError> {
        let end = match self.settings.end_block {
            EndBlock::Fixed(block) => block,
            EndBlock::Head => {
                let head = self
                    .fetcher
                    .call("eth_blockNumber", || self.claims.current_block_number())
                    .await?;
                info!("Resolved chain head to block {}", head);
                head
            }
        };
        BlockRange::new(self.settings.start_block, end)
    }

    async fn scan(
        &self,
        range: BlockRange,
        writer: &SinkWriter,
        shutdown: &Shutdown,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let classifier =
            ActivityClassifier::new(self.activity.as_ref(), &self.fetcher, self.classifier.clone())?;
        let claim_scanner = ClaimScanner::new(self.claims.as_ref(), &self.fetcher);
        let batches = claim_scanner.scan(range, self.settings.claim_chunk_size)?;
        futures::pin_mut!(batches);

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, not scanning further claim ranges");
                summary.cancelled = true;
                break;
            }

            let Some(batch) = batches.next().await else {
                break;
            };
            let batch = batch?;
            summary.claim_ranges += 1;
            summary.claims += batch.claims.len() as u64;
            info!(
                "------ Blocks {}: found {} claims ------",
                batch.range,
                batch.claims.len()
            );

            let outcome = self.classify_batch(&classifier, batch.claims, shutdown).await;
            summary.classified += outcome.verdicts.len() as u64;
            summary.suspicious += outcome.verdicts.iter().filter(|v| v.is_suspicious()).count() as u64;
            summary.failed.extend(outcome.failures.iter().cloned());

            let verdicts = match self.settings.report_mode {
                ReportMode::Suspicious => outcome
                    .verdicts
                    .into_iter()
                    .filter(WalletVerdict::is_suspicious)
                    .collect(),
                ReportMode::Enriched => outcome.verdicts,
            };
            writer
                .send(VerdictBatch {
                    range: batch.range,
                    verdicts,
                    failures: outcome.failures,
                    complete: outcome.complete,
                })
                .await?;

            if !outcome.complete {
                summary.cancelled = true;
                break;
            }
        }

        Ok(())
    }

    /// Classify every claimant of one sub-range with at most `concurrency`
    /// wallets in flight. Returns once all of them are done (batch barrier).
    ///
    /// After cancellation no new wallets are started; in-flight ones get
    /// `shutdown_grace` to finish before they are abandoned.
    async fn classify_batch(
        &self,
        classifier: &ActivityClassifier<'_, A>,
        claims: Vec<ClaimEvent>,
        shutdown: &Shutdown,
    ) -> BatchOutcome {
        let expected = claims.len();
        let gate = shutdown.clone();
        let results = stream::iter(claims)
            .take_while(move |_| future::ready(!gate.is_cancelled()))
            .map(move |claim| async move {
                let report = classifier.classify(claim.recipient).await;
                (claim, report)
            })
            .buffer_unordered(self.settings.concurrency);
        futures::pin_mut!(results);

        let mut outcome = BatchOutcome::default();
        let mut watcher = shutdown.clone();
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, results.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Shutdown grace period elapsed, abandoning in-flight classifications");
                        break;
                    }
                },
                None => tokio::select! {
                    next = results.next() => next,
                    _ = watcher.cancelled() => {
                        info!(
                            "Shutdown requested, waiting up to {:?} for in-flight classifications",
                            self.settings.shutdown_grace
                        );
                        deadline = Some(Instant::now() + self.settings.shutdown_grace);
                        continue;
                    }
                },
            };

            let Some((claim, report)) = next else {
                break;
            };

            match report {
                Ok(report) => {
                    let verdict =
                        WalletVerdict::new(&claim, &report.buy_events, &report.sell_events);
                    if verdict.is_suspicious() {
                        warn!(
                            "No marketplace activity for {} (claimed {}, tx {:?})",
                            verdict.wallet, verdict.claimed, verdict.tx_hash
                        );
                    } else if verdict.has_sell {
                        info!("{}: has sales", verdict.wallet);
                    } else {
                        info!("{}: has buys", verdict.wallet);
                    }
                    outcome.verdicts.push(verdict);
                }
                Err(e) => {
                    error!(
                        "Classification of {} failed, continuing with remaining claimants: {}",
                        claim.recipient, e
                    );
                    outcome.failures.push(FailedClassification {
                        wallet: claim.recipient,
                        tx_hash: claim.tx_hash,
                        block_number: claim.block_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome.complete = outcome.verdicts.len() + outcome.failures.len() == expected;
        outcome
    }
}
