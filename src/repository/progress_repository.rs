use super::models::ScanProgress;
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct ProgressRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ProgressRepository<'a> {
    const UPSERT_PROGRESS: &'static str =
        "INSERT INTO scan_progress (claims_contract, last_processed_block) VALUES (?1, ?2)
         ON CONFLICT(claims_contract) DO UPDATE SET
            last_processed_block = MAX(last_processed_block, excluded.last_processed_block)";

    const GET_LAST_PROCESSED_BLOCK: &'static str =
        "SELECT last_processed_block FROM scan_progress WHERE claims_contract = ?1";

    const LIST_PROGRESS: &'static str =
        "SELECT claims_contract, last_processed_block FROM scan_progress ORDER BY claims_contract";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_last_processed_block(&self, contract: &Address) -> Result<Option<u64>> {
        let block: Option<u64> = self
            .conn
            .query_row(
                Self::GET_LAST_PROCESSED_BLOCK,
                params![format!("{:?}", contract)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(block)
    }

    /// Never moves the checkpoint backwards.
    pub fn update_last_processed_block(
        &self,
        contract: &Address,
        block_number: u64,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            Self::UPSERT_PROGRESS,
            params![format!("{:?}", contract), block_number],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ScanProgress>> {
        let mut stmt = self.conn.prepare(Self::LIST_PROGRESS)?;
        let rows = stmt
            .query_map([], |row| {
                let claims_contract = row.get::<_, String>(0)?.parse::<Address>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(ScanProgress {
                    claims_contract,
                    last_processed_block: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
