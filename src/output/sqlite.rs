use crate::error::SinkError;
use crate::repository::{Database, ProgressRepository, VerdictRepository};
use crate::sink_worker::{VerdictBatch, VerdictSink};
use alloy_primitives::Address;

/// Stores verdicts and failures, checkpointing the claims contract's
/// progress after every fully classified batch.
pub struct SqliteSink {
    db: Database,
    claims_contract: Address,
}

impl SqliteSink {
    pub fn new(db: Database, claims_contract: Address) -> Self {
        Self {
            db,
            claims_contract,
        }
    }

    pub fn open(path: &str, claims_contract: Address) -> anyhow::Result<Self> {
        Ok(Self::new(Database::new(path)?, claims_contract))
    }

    /// Last claim block whose batch was fully classified by an earlier run.
    pub fn last_processed_block(&self) -> anyhow::Result<Option<u64>> {
        ProgressRepository::new(&self.db.conn).get_last_processed_block(&self.claims_contract)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl VerdictSink for SqliteSink {
    fn write_batch(&mut self, batch: &VerdictBatch) -> Result<usize, SinkError> {
        let verdicts = VerdictRepository::new(&self.db.conn);
        let written = verdicts.insert_batch(&batch.verdicts)?;
        verdicts.insert_failures(&batch.failures)?;

        // A cancelled batch left claimants unclassified; rescan it next time
        if batch.complete {
            ProgressRepository::new(&self.db.conn)
                .update_last_processed_block(&self.claims_contract, batch.range.end)?;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::claim;
    use crate::types::{BlockRange, FailedClassification, WalletVerdict};

    fn sink() -> SqliteSink {
        SqliteSink::new(Database::in_memory().unwrap(), Address::repeat_byte(0x3b))
    }

    fn batch(start: u64, complete: bool) -> VerdictBatch {
        let claim = claim(0x01, 1000, (start / 100) as u8, start);
        VerdictBatch {
            range: BlockRange::new(start, start + 99).unwrap(),
            verdicts: vec![WalletVerdict::new(&claim, &[], &[])],
            failures: vec![FailedClassification {
                wallet: Address::repeat_byte(0x02),
                tx_hash: claim.tx_hash,
                block_number: start,
                error: "rate limited".to_string(),
            }],
            complete,
        }
    }

    #[test]
    fn test_complete_batch_advances_checkpoint() {
        let mut sink = sink();
        assert_eq!(sink.last_processed_block().unwrap(), None);

        assert_eq!(sink.write_batch(&batch(100, true)).unwrap(), 1);
        assert_eq!(sink.last_processed_block().unwrap(), Some(199));

        let repo = VerdictRepository::new(&sink.database().conn);
        assert_eq!(repo.get_failures(10, 0).unwrap().len(), 1);
        assert_eq!(repo.query_suspicious(None, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_incomplete_batch_keeps_checkpoint() {
        let mut sink = sink();
        sink.write_batch(&batch(100, true)).unwrap();
        sink.write_batch(&batch(200, false)).unwrap();

        assert_eq!(sink.last_processed_block().unwrap(), Some(199));
        let stats = VerdictRepository::new(&sink.database().conn)
            .get_statistics()
            .unwrap();
        assert_eq!(stats.total_verdicts, 2);
    }
}
