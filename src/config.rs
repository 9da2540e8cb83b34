use crate::classifier::ClassifierSettings;
use crate::retry::RetryPolicy;
use crate::rpc::Contracts;
use crate::scanner::{EndBlock, ReportMode, ScanSettings};
use alloy_primitives::{Address, address};
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CLAIMS_CONTRACT: Address = address!("0x3b484b82567a09e2588A13D54D032153f0c0aEe0");
pub const DEFAULT_ACTIVITY_CONTRACT: Address =
    address!("0x7Be8076f4EA4A4AD08075C2508e481d6C946D12b");

/// First block of the claim window; also the default activity cutoff.
pub const DEFAULT_SCAN_START_BLOCK: u64 = 13_860_522;
pub const DEFAULT_ACTIVITY_START_BLOCK: u64 = 5_774_644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    Csv,
    Sqlite,
}

impl FromStr for OutputSink {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputSink::Csv),
            "sqlite" => Ok(OutputSink::Sqlite),
            other => Err(format!("Unknown output sink: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub claims_contract_address: Address,
    pub activity_contract_address: Address,
    pub scan_start_block: u64,
    pub scan_end_block: EndBlock,
    pub activity_start_block: u64,
    pub activity_cutoff_block: u64,
    pub claim_chunk_size: u64,
    pub activity_chunk_size: u64,
    pub concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub wide_buyer_query: bool,
    pub report_mode: ReportMode,
    pub output_sink: OutputSink,
    pub output_path: String,
    pub shutdown_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        // Support both a comma-separated list and a single URL
        let json_rpc_urls: Vec<String> = match std::env::var("JSON_RPC_URLS") {
            Ok(urls) => urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => vec![
                std::env::var("JSON_RPC_URL")
                    .context("JSON_RPC_URLS or JSON_RPC_URL must be set in .env")?,
            ],
        };

        if json_rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("JSON_RPC_URLS contains no usable URL"));
        }

        let claims_contract_address =
            env_parse("CLAIMS_CONTRACT_ADDRESS")?.unwrap_or(DEFAULT_CLAIMS_CONTRACT);
        let activity_contract_address =
            env_parse("ACTIVITY_CONTRACT_ADDRESS")?.unwrap_or(DEFAULT_ACTIVITY_CONTRACT);

        let report_mode = env_parse("REPORT_MODE")?.unwrap_or(ReportMode::Suspicious);
        let output_sink = env_parse("OUTPUT_SINK")?.unwrap_or(OutputSink::Csv);
        let output_path = std::env::var("OUTPUT_PATH").unwrap_or_else(|_| {
            match output_sink {
                OutputSink::Csv => "sos_scan.csv",
                OutputSink::Sqlite => "sos_scan.db",
            }
            .to_string()
        });

        let config = Config {
            json_rpc_urls,
            claims_contract_address,
            activity_contract_address,
            scan_start_block: env_parse("SCAN_START_BLOCK")?.unwrap_or(DEFAULT_SCAN_START_BLOCK),
            scan_end_block: env_parse("SCAN_END_BLOCK")?.unwrap_or(EndBlock::Head),
            activity_start_block: env_parse("ACTIVITY_START_BLOCK")?
                .unwrap_or(DEFAULT_ACTIVITY_START_BLOCK),
            activity_cutoff_block: env_parse("ACTIVITY_CUTOFF_BLOCK")?
                .unwrap_or(DEFAULT_SCAN_START_BLOCK),
            claim_chunk_size: env_parse("CLAIM_CHUNK_SIZE")?.unwrap_or(5_000),
            activity_chunk_size: env_parse("ACTIVITY_CHUNK_SIZE")?.unwrap_or(100_000),
            concurrency: env_parse("CONCURRENCY")?.unwrap_or(4),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS")?.unwrap_or(5),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS")?.unwrap_or(100),
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS")?.unwrap_or(10_000),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")?.unwrap_or(120),
            wide_buyer_query: env_parse("WIDE_BUYER_QUERY")?.unwrap_or(false),
            report_mode,
            output_sink,
            output_path,
            shutdown_grace_secs: env_parse("SHUTDOWN_GRACE_SECS")?.unwrap_or(30),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.claim_chunk_size == 0 || self.activity_chunk_size == 0 {
            return Err(anyhow::anyhow!("Chunk sizes must be greater than zero"));
        }
        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("CONCURRENCY must be greater than zero"));
        }
        if self.activity_start_block > self.activity_cutoff_block {
            return Err(anyhow::anyhow!(
                "ACTIVITY_START_BLOCK ({}) is after ACTIVITY_CUTOFF_BLOCK ({})",
                self.activity_start_block,
                self.activity_cutoff_block
            ));
        }
        if let EndBlock::Fixed(end) = self.scan_end_block
            && end < self.scan_start_block
        {
            return Err(anyhow::anyhow!(
                "SCAN_END_BLOCK ({end}) is before SCAN_START_BLOCK ({})",
                self.scan_start_block
            ));
        }
        Ok(())
    }

    pub fn contracts(&self) -> Contracts {
        Contracts {
            claims: self.claims_contract_address,
            activity: self.activity_contract_address,
        }
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            start_block: self.scan_start_block,
            end_block: self.scan_end_block,
            claim_chunk_size: self.claim_chunk_size,
            concurrency: self.concurrency,
            report_mode: self.report_mode,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            activity_start: self.activity_start_block,
            cutoff: self.activity_cutoff_block,
            chunk_size: self.activity_chunk_size,
            wide_buyer_query: self.wide_buyer_query,
            mode: self.report_mode.classify_mode(),
        }
    }
}

/// Parse an optional environment variable, failing loudly on malformed values.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        _ => Ok(None),
    }
}
