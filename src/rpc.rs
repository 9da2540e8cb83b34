use crate::error::RemoteQueryError;
use crate::events::{OrdersMatched, Transfer, decode_activity_event, decode_claim_event};
use crate::source::{ActivitySource, ChainHead, ClaimsSource};
use crate::types::{ActivityEvent, BlockRange, ClaimEvent, Role};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

static RATE_LIMITED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b429\b|rate.?limit|too many requests").ok());

static SUGGESTED_RANGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"retry with the range (\d+)-(\d+)").ok());

/// On-chain addresses of the two scanned contracts.
#[derive(Debug, Clone, Copy)]
pub struct Contracts {
    pub claims: Address,
    pub activity: Address,
}

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    request_timeout: Duration,
    contracts: Contracts,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], request_timeout: Duration, contracts: Contracts) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            request_timeout,
            contracts,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn handle_error(&self, error_str: &str) -> RemoteQueryError {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
        classify_error(error_str)
    }

    fn handle_timeout(&self) -> RemoteQueryError {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            self.request_timeout.as_secs(),
            current_url
        );
        self.rotate_provider();
        RemoteQueryError::Timeout(self.request_timeout.as_secs())
    }

    pub async fn get_latest_block(&self) -> Result<u64, RemoteQueryError> {
        let provider = self.get_provider();
        match timeout(self.request_timeout, provider.get_block_number()).await {
            Ok(Ok(block_number)) => Ok(block_number),
            Ok(Err(e)) => Err(self.handle_error(&e.to_string())),
            Err(_) => Err(self.handle_timeout()),
        }
    }

    async fn get_logs_once(&self, filter: &Filter) -> Result<Vec<Log>, LogsError> {
        let provider = self.get_provider();
        match timeout(self.request_timeout, provider.get_logs(filter)).await {
            Ok(Ok(logs)) => Ok(logs),
            Ok(Err(e)) => {
                let error_str = e.to_string();
                if let Some(range) = parse_max_results_error(&error_str) {
                    Err(LogsError::TooManyResults(range))
                } else {
                    Err(LogsError::Remote(self.handle_error(&error_str)))
                }
            }
            Err(_) => Err(LogsError::Remote(self.handle_timeout())),
        }
    }

    /// Fetch logs for `range`, following the node's suggested sub-range
    /// whenever it refuses a response as too large.
    pub async fn get_logs(&self, base: &Filter, range: BlockRange) -> Result<Vec<Log>, RemoteQueryError> {
        let mut all_logs = Vec::new();
        let mut current_from = range.start;

        while current_from <= range.end {
            let filter = base.clone().from_block(current_from).to_block(range.end);

            match self.get_logs_once(&filter).await {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(LogsError::TooManyResults((suggested_from, suggested_to)))
                    if suggested_from == current_from && suggested_to < range.end =>
                {
                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, range.end, suggested_to
                    );
                    let filter = base.clone().from_block(suggested_from).to_block(suggested_to);
                    let logs = self.get_logs_once(&filter).await.map_err(LogsError::into_remote)?;
                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
                Err(e) => return Err(e.into_remote()),
            }
        }

        Ok(all_logs)
    }

    fn claims_filter(&self) -> Filter {
        Filter::new()
            .address(self.contracts.claims)
            .event_signature(Transfer::SIGNATURE_HASH)
            .topic1(Address::ZERO.into_word())
    }

    fn activity_filter(&self, role: Role, wallet: Address) -> Filter {
        let filter = Filter::new()
            .address(self.contracts.activity)
            .event_signature(OrdersMatched::SIGNATURE_HASH);
        match role {
            Role::Seller => filter.topic1(wallet.into_word()),
            Role::Buyer => filter.topic2(wallet.into_word()),
        }
    }
}

enum LogsError {
    TooManyResults((u64, u64)),
    Remote(RemoteQueryError),
}

impl LogsError {
    fn into_remote(self) -> RemoteQueryError {
        match self {
            LogsError::TooManyResults((from, to)) => RemoteQueryError::Rpc(format!(
                "query returned more than the max results, node suggested {from}-{to}"
            )),
            LogsError::Remote(e) => e,
        }
    }
}

fn classify_error(error_str: &str) -> RemoteQueryError {
    let rate_limited = RATE_LIMITED
        .as_ref()
        .is_some_and(|re| re.is_match(error_str));
    if rate_limited {
        RemoteQueryError::RateLimited(error_str.to_string())
    } else {
        RemoteQueryError::Rpc(error_str.to_string())
    }
}

fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
    if !error_str.contains("exceeds max results") {
        return None;
    }
    let captures = SUGGESTED_RANGE.as_ref()?.captures(error_str)?;

    let from = captures.get(1)?.as_str().parse().ok()?;
    let to = captures.get(2)?.as_str().parse().ok()?;

    Some((from, to))
}

#[async_trait]
impl ChainHead for RpcClient {
    async fn current_block_number(&self) -> Result<u64, RemoteQueryError> {
        self.get_latest_block().await
    }
}

#[async_trait]
impl ClaimsSource for RpcClient {
    async fn query_claims(&self, range: BlockRange) -> Result<Vec<ClaimEvent>, RemoteQueryError> {
        let logs = self.get_logs(&self.claims_filter(), range).await?;

        let mut claims = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_claim_event(&log) {
                Ok(claim) => claims.push(claim),
                Err(e) => warn!("Failed to decode claim event: {}", e),
            }
        }
        Ok(claims)
    }
}

#[async_trait]
impl ActivitySource for RpcClient {
    async fn query_orders_matched(
        &self,
        role: Role,
        wallet: Address,
        range: BlockRange,
    ) -> Result<Vec<ActivityEvent>, RemoteQueryError> {
        let logs = self.get_logs(&self.activity_filter(role, wallet), range).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_activity_event(&log, role) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Failed to decode OrdersMatched event: {}", e),
            }
        }
        Ok(events)
    }
}
