use crate::error::SinkError;
use crate::scanner::ReportMode;
use crate::sink_worker::{VerdictBatch, VerdictSink};
use crate::types::{WalletVerdict, format_ether};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

const SUSPICIOUS_HEADERS: [&str; 3] = ["Wallet", "Claimed", "Tx Hash"];
const ENRICHED_HEADERS: [&str; 8] = [
    "Wallet",
    "Claimed",
    "Tx Hash",
    "Buy Count",
    "Total ETH Buy",
    "Sell Count",
    "Total ETH Sell",
    "Suspicious",
];

#[derive(Debug, Serialize)]
struct SuspiciousRecord {
    wallet: String,
    claimed: String,
    tx_hash: String,
}

#[derive(Debug, Serialize)]
struct EnrichedRecord {
    wallet: String,
    claimed: String,
    tx_hash: String,
    buy_count: u32,
    total_eth_buy: String,
    sell_count: u32,
    total_eth_sell: String,
    suspicious: bool,
}

impl From<&WalletVerdict> for SuspiciousRecord {
    fn from(v: &WalletVerdict) -> Self {
        Self {
            wallet: v.wallet.to_checksum(None),
            claimed: v.claimed.clone(),
            tx_hash: format!("{:?}", v.tx_hash),
        }
    }
}

impl From<&WalletVerdict> for EnrichedRecord {
    fn from(v: &WalletVerdict) -> Self {
        Self {
            wallet: v.wallet.to_checksum(None),
            claimed: v.claimed.clone(),
            tx_hash: format!("{:?}", v.tx_hash),
            buy_count: v.buy_count,
            total_eth_buy: format_ether(v.total_buy_wei),
            sell_count: v.sell_count,
            total_eth_sell: format_ether(v.total_sell_wei),
            suspicious: v.is_suspicious(),
        }
    }
}

/// Appends one CSV row per verdict, flushing after every batch.
pub struct CsvSink<W: Write> {
    writer: ::csv::Writer<W>,
    mode: ReportMode,
}

impl CsvSink<File> {
    /// Open `path` for appending. The header row is written only when the
    /// file is new or empty, so reruns keep adding to the same report.
    pub fn append(path: impl AsRef<Path>, mode: ReportMode) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        Self::from_writer(file, mode, is_empty)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W, mode: ReportMode, write_header: bool) -> Result<Self, SinkError> {
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);

        if write_header {
            match mode {
                ReportMode::Suspicious => writer.write_record(SUSPICIOUS_HEADERS)?,
                ReportMode::Enriched => writer.write_record(ENRICHED_HEADERS)?,
            }
            writer.flush()?;
        }

        Ok(Self { writer, mode })
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(std::io::Error::other(e.to_string())))
    }
}

impl<W: Write + Send + 'static> VerdictSink for CsvSink<W> {
    fn write_batch(&mut self, batch: &VerdictBatch) -> Result<usize, SinkError> {
        for verdict in &batch.verdicts {
            match self.mode {
                ReportMode::Suspicious => self.writer.serialize(SuspiciousRecord::from(verdict))?,
                ReportMode::Enriched => self.writer.serialize(EnrichedRecord::from(verdict))?,
            }
        }
        self.writer.flush()?;
        Ok(batch.verdicts.len())
    }
}
