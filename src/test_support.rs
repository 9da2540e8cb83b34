//! In-memory doubles for the chain sources and the output sink.

use crate::error::{RemoteQueryError, SinkError};
use crate::retry::{RetryPolicy, RetryingFetcher};
use crate::sink_worker::{VerdictBatch, VerdictSink};
use crate::source::{ActivitySource, ChainHead, ClaimsSource};
use crate::types::{ActivityEvent, BlockRange, ClaimEvent, Role};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn wallet(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

pub fn claim(recipient: u8, amount_ether: u64, tx: u8, block: u64) -> ClaimEvent {
    ClaimEvent {
        recipient: wallet(recipient),
        amount_raw: ether(amount_ether),
        tx_hash: B256::with_last_byte(tx),
        block_number: block,
        log_index: 0,
    }
}

pub fn fast_fetcher(max_attempts: u32) -> RetryingFetcher {
    RetryingFetcher::new(
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2)).unwrap(),
    )
}

#[derive(Debug, Clone)]
struct Trade {
    wallet: Address,
    role: Role,
    block: u64,
    price: U256,
}

/// A fake node serving claims and marketplace activity from memory.
#[derive(Default)]
pub struct MockChain {
    claims: Vec<ClaimEvent>,
    trades: Vec<Trade>,
    head: u64,
    max_range: Option<u64>,
    fail_claims: bool,
    failing_wallets: Mutex<HashMap<Address, u32>>,
    activity_delay: Option<Duration>,
    claim_calls: AtomicUsize,
    head_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    activity_calls: Mutex<Vec<(Role, Address, BlockRange)>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            head: 200,
            ..Default::default()
        }
    }

    pub fn with_head(mut self, head: u64) -> Self {
        self.head = head;
        self
    }

    pub fn with_claim(mut self, claim: ClaimEvent) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_activity(mut self, wallet: Address, role: Role, block: u64, price: U256) -> Self {
        self.trades.push(Trade {
            wallet,
            role,
            block,
            price,
        });
        self
    }

    /// Refuse any query spanning more than `blocks` blocks.
    pub fn with_max_range(mut self, blocks: u64) -> Self {
        self.max_range = Some(blocks);
        self
    }

    pub fn with_activity_delay(mut self, delay: Duration) -> Self {
        self.activity_delay = Some(delay);
        self
    }

    pub fn failing_claims(mut self) -> Self {
        self.fail_claims = true;
        self
    }

    /// Fail the next `times` activity queries for `wallet`.
    pub fn failing_wallet(self, wallet: Address, times: u32) -> Self {
        if let Ok(mut failing) = self.failing_wallets.lock() {
            failing.insert(wallet, times);
        }
        self
    }

    pub fn claim_queries(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn head_queries(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn activity_queries(&self, role: Role) -> usize {
        self.activity_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| *r == role)
            .count()
    }

    pub fn activity_queries_for(&self, wallet: Address) -> usize {
        self.activity_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w, _)| *w == wallet)
            .count()
    }

    /// Highest number of activity queries observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_queried_block(&self) -> u64 {
        self.activity_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, r)| r.end)
            .max()
            .unwrap_or_default()
    }

    fn check_range(&self, range: BlockRange) -> Result<(), RemoteQueryError> {
        match self.max_range {
            Some(max) if range.width() > max => Err(RemoteQueryError::Rpc(format!(
                "block range {range} exceeds limit of {max}"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ClaimsSource for MockChain {
    async fn query_claims(&self, range: BlockRange) -> Result<Vec<ClaimEvent>, RemoteQueryError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_claims {
            return Err(RemoteQueryError::Timeout(1));
        }
        self.check_range(range)?;

        Ok(self
            .claims
            .iter()
            .filter(|c| range.contains(c.block_number))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActivitySource for MockChain {
    async fn query_orders_matched(
        &self,
        role: Role,
        wallet: Address,
        range: BlockRange,
    ) -> Result<Vec<ActivityEvent>, RemoteQueryError> {
        self.activity_calls.lock().unwrap().push((role, wallet, range));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.activity_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failing = self.failing_wallets.lock().unwrap();
            if let Some(remaining) = failing.get_mut(&wallet)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RemoteQueryError::RateLimited("429 Too Many Requests".into()));
            }
        }
        self.check_range(range)?;

        Ok(self
            .trades
            .iter()
            .filter(|t| t.wallet == wallet && t.role == role && range.contains(t.block))
            .map(|t| ActivityEvent {
                price: t.price,
                role: t.role,
            })
            .collect())
    }
}

#[async_trait]
impl ChainHead for MockChain {
    async fn current_block_number(&self) -> Result<u64, RemoteQueryError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.head)
    }
}

/// Collects flushed batches; optionally fails every write.
#[derive(Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<VerdictBatch>>>,
    broken: bool,
}

impl MemorySink {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<VerdictBatch> {
        self.batches.lock().unwrap().clone()
    }
}

impl VerdictSink for MemorySink {
    fn write_batch(&mut self, batch: &VerdictBatch) -> Result<usize, SinkError> {
        if self.broken {
            return Err(SinkError::Io(std::io::Error::other("disk full")));
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(batch.verdicts.len())
    }
}
