use thiserror::Error;

/// Failure of a single call against the remote node.
///
/// Every variant is treated as transient and retried by the fetcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteQueryError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited by endpoint: {0}")]
    RateLimited(String),

    #[error("remote query failed: {0}")]
    Rpc(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        #[source]
        source: RemoteQueryError,
    },

    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database write failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("sink worker stopped: {0}")]
    WorkerGone(String),
}

impl ScanError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ScanError::InvalidArgument(msg.into())
    }
}
