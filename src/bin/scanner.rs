use anyhow::Result;
use clap::Parser;
use claim_scanner::config::{Config, OutputSink};
use claim_scanner::output::{CsvSink, SqliteSink};
use claim_scanner::retry::RetryingFetcher;
use claim_scanner::rpc::RpcClient;
use claim_scanner::scanner::{EndBlock, ReportMode, ScanSettings, ScanSummary, Scanner};
use claim_scanner::shutdown::Shutdown;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scanner")]
#[command(about = "Flag token claimants with no marketplace history before the claim window", long_about = None)]
struct Cli {
    /// First claim block to scan
    #[arg(long)]
    start_block: Option<u64>,

    /// Last claim block to scan, or "head"
    #[arg(long)]
    end_block: Option<EndBlock>,

    /// Wallets classified concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Report every claimant with buy/sell counts and totals
    #[arg(long)]
    enriched: bool,

    /// Continue after the last checkpointed block (SQLite output only)
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Starting claim scanner");

    let mut config = Config::from_env()?;
    if let Some(start) = cli.start_block {
        config.scan_start_block = start;
    }
    if let Some(end) = cli.end_block {
        config.scan_end_block = end;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.enriched {
        config.report_mode = ReportMode::Enriched;
    }
    config.validate()?;

    info!("Configuration loaded");
    info!("Claims contract: {:?}", config.claims_contract_address);
    info!("Activity contract: {:?}", config.activity_contract_address);
    info!(
        "Activity window: blocks {}-{} ({} blocks per query)",
        config.activity_start_block, config.activity_cutoff_block, config.activity_chunk_size
    );
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let client = Arc::new(RpcClient::new(
        &config.json_rpc_urls,
        config.request_timeout(),
        config.contracts(),
    )?);
    info!("RPC client connected");

    let fetcher = RetryingFetcher::new(config.retry_policy()?);

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight classifications");
            trigger.cancel();
        }
    });

    let result = match config.output_sink {
        OutputSink::Csv => {
            if cli.resume {
                warn!("--resume needs OUTPUT_SINK=sqlite, scanning from the configured start");
            }
            let sink = CsvSink::append(&config.output_path, config.report_mode)?;
            let scanner = Scanner::new(
                client.clone(),
                client,
                fetcher,
                config.scan_settings(),
                config.classifier_settings(),
            )?;
            scanner.run(sink, shutdown).await
        }
        OutputSink::Sqlite => {
            let sink = SqliteSink::open(&config.output_path, config.claims_contract_address)?;
            let mut settings = config.scan_settings();
            if cli.resume && !apply_checkpoint(&mut settings, sink.last_processed_block()?) {
                info!("Nothing left to scan after the last checkpoint");
                return Ok(());
            }
            let scanner = Scanner::new(
                client.clone(),
                client,
                fetcher,
                settings,
                config.classifier_settings(),
            )?;
            scanner.run(sink, shutdown).await
        }
    };

    match result {
        Ok(summary) => {
            log_summary(&summary, &config.output_path);
            Ok(())
        }
        Err(e) => {
            error!("Scanner error: {}", e);
            Err(e.into())
        }
    }
}

/// Move the start past the checkpoint. Returns false when the fixed end
/// block has already been processed.
fn apply_checkpoint(settings: &mut ScanSettings, last_processed: Option<u64>) -> bool {
    let Some(last) = last_processed else {
        return true;
    };
    let next = last.saturating_add(1);
    if next > settings.start_block {
        info!("Resuming after checkpoint at block {}", last);
        settings.start_block = next;
    }
    match settings.end_block {
        EndBlock::Fixed(end) => settings.start_block <= end,
        EndBlock::Head => true,
    }
}

fn log_summary(summary: &ScanSummary, output_path: &str) {
    info!(
        "Scanned blocks {} in {} claim range(s): {} claim(s), {} classified, {} suspicious",
        summary.range, summary.claim_ranges, summary.claims, summary.classified, summary.suspicious
    );
    info!(
        "Wrote {} record(s) to {} ({} RPC attempts, {} transient failures)",
        summary.records_written,
        output_path,
        summary.fetch.attempts,
        summary.fetch.transient_failures
    );

    if !summary.failed.is_empty() {
        warn!("{} wallet(s) could not be classified:", summary.failed.len());
        for failure in &summary.failed {
            warn!(
                "  {:?} (claim tx {:?}): {}",
                failure.wallet, failure.tx_hash, failure.error
            );
        }
    }

    if summary.cancelled {
        warn!("Scan was interrupted before reaching block {}", summary.range.end);
    }
}
