use crate::error::SinkError;
use crate::types::{BlockRange, FailedClassification, WalletVerdict};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything classified for one claim sub-range.
#[derive(Debug, Clone)]
pub struct VerdictBatch {
    pub range: BlockRange,
    pub verdicts: Vec<WalletVerdict>,
    pub failures: Vec<FailedClassification>,
    /// False when cancellation left some claimants of the range unclassified.
    pub complete: bool,
}

/// Storage for classified verdicts. Only ever driven by the sink worker.
pub trait VerdictSink: Send + 'static {
    /// Persist one batch and return the number of records written.
    fn write_batch(&mut self, batch: &VerdictBatch) -> Result<usize, SinkError>;
}

/// Cloneable handle feeding the single sink worker.
#[derive(Clone)]
pub struct SinkWriter {
    tx: mpsc::Sender<VerdictBatch>,
}

impl SinkWriter {
    pub fn spawn<S: VerdictSink>(
        sink: S,
        capacity: usize,
    ) -> (Self, JoinHandle<Result<u64, SinkError>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_sink_worker(sink, rx));
        (Self { tx }, worker)
    }

    pub async fn send(&self, batch: VerdictBatch) -> Result<(), SinkError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| SinkError::WorkerGone("sink worker is no longer receiving".to_string()))
    }
}

pub async fn run_sink_worker<S: VerdictSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<VerdictBatch>,
) -> Result<u64, SinkError> {
    let mut written = 0u64;

    while let Some(batch) = rx.recv().await {
        // Use spawn_blocking since file and database writes are blocking
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = process_batch(&mut sink, &batch);
            (sink, result)
        })
        .await
        .map_err(|e| SinkError::WorkerGone(e.to_string()))?;

        sink = returned;
        written += result? as u64;
    }

    Ok(written)
}

fn process_batch<S: VerdictSink>(sink: &mut S, batch: &VerdictBatch) -> Result<usize, SinkError> {
    let start = Instant::now();
    let written = sink.write_batch(batch)?;
    info!(
        "Flushed {} record(s) for blocks {} in {:?}",
        written,
        batch.range,
        start.elapsed()
    );
    Ok(written)
}
