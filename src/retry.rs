use crate::error::{RemoteQueryError, ScanError};
use crate::types::{BlockRange, EventFilter};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Bounded-attempt retry with jittered exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Result<Self, ScanError> {
        if max_attempts == 0 {
            return Err(ScanError::invalid("retry policy needs at least one attempt"));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delays between attempts: doubling from `base_delay`, capped at
    /// `max_delay`, each scaled by a random jitter factor in `[0, 1)`.
    fn strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts as usize - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Counters shared by every fetch issued during a scan.
#[derive(Debug, Default)]
pub struct FetchStats {
    attempts: AtomicU64,
    transient_failures: AtomicU64,
    exhausted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStatsSnapshot {
    pub attempts: u64,
    pub transient_failures: u64,
    pub exhausted: u64,
}

impl FetchStats {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Wraps single log queries with the retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    stats: Arc<FetchStats>,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Arc::new(FetchStats::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Run a log query until it succeeds or the policy's attempts are used up.
    ///
    /// An empty result is a final answer and is never retried.
    pub async fn fetch<R, F, Fut>(
        &self,
        filter: &EventFilter,
        range: BlockRange,
        query: F,
    ) -> Result<R, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, RemoteQueryError>>,
    {
        self.retry(format!("{filter} over {range}"), query).await
    }

    /// Retry any other remote call, such as reading the chain head.
    pub async fn call<R, F, Fut>(&self, operation: &str, query: F) -> Result<R, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, RemoteQueryError>>,
    {
        self.retry(operation.to_string(), query).await
    }

    async fn retry<R, F, Fut>(&self, operation: String, mut query: F) -> Result<R, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, RemoteQueryError>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.policy.max_attempts;
        let stats = &self.stats;
        let op = operation.as_str();

        let result = Retry::spawn(self.policy.strategy(), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            stats.record_attempt();
            let call = query();
            async move {
                debug!(operation = op, attempt, "querying");
                match call.await {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        stats.record_failure();
                        warn!(
                            operation = op,
                            attempt,
                            max_attempts,
                            error = %e,
                            "remote query failed"
                        );
                        Err(e)
                    }
                }
            }
        })
        .await;

        result.map_err(|source| {
            self.stats.record_exhausted();
            ScanError::ExhaustedRetries {
                attempts: attempts.load(Ordering::Relaxed),
                operation,
                source,
            }
        })
    }
}
