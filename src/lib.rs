pub mod chunker;
pub mod claims;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod output;
pub mod query;
pub mod repository;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod shutdown;
pub mod sink_worker;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{RemoteQueryError, ScanError, SinkError};
pub use scanner::{EndBlock, ReportMode, ScanSettings, ScanSummary, Scanner};
pub use types::{ActivityEvent, BlockRange, ClaimEvent, Role, WalletVerdict};
