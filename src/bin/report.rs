use anyhow::Result;
use clap::{Parser, Subcommand};
use claim_scanner::query::commands::{
    SuspiciousQuery, cmd_failures, cmd_stats, cmd_suspicious, cmd_wallet,
};
use claim_scanner::query::formatters::OutputFormat;
use claim_scanner::repository::{Database, ProgressRepository, VerdictRepository};

#[derive(Parser)]
#[command(name = "report")]
#[command(about = "Query verdicts stored by the scanner's SQLite output", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Database written by the scanner; defaults to OUTPUT_PATH or sos_scan.db
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Claimants with no marketplace activity before the cutoff
    Suspicious {
        #[arg(long)]
        block: Option<u64>,

        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        block_range: Option<Vec<u64>>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Every stored verdict for one wallet
    Wallet { address: String },
    /// Claimants whose classification exhausted its retries
    Failures {
        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    dotenv::dotenv().ok();
    let db_path = cli
        .db
        .or_else(|| std::env::var("OUTPUT_PATH").ok())
        .unwrap_or_else(|| "sos_scan.db".to_string());

    let db = Database::new(&db_path)?;
    let verdict_repo = VerdictRepository::new(&db.conn);
    let progress_repo = ProgressRepository::new(&db.conn);

    match cli.command {
        Commands::Suspicious {
            block,
            block_range,
            limit,
            offset,
        } => {
            let block_range = block_range.and_then(|v| match v.as_slice() {
                [start, end] => Some((*start, *end)),
                _ => None,
            });
            let query = SuspiciousQuery {
                block,
                block_range,
                limit,
                offset,
            };
            cmd_suspicious(&verdict_repo, query, &format)?;
        }
        Commands::Wallet { address } => {
            cmd_wallet(&verdict_repo, &address, &format)?;
        }
        Commands::Failures { limit, offset } => {
            cmd_failures(&verdict_repo, limit, offset, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&verdict_repo, &progress_repo, &format)?;
        }
    }

    Ok(())
}
