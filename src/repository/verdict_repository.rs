use super::models::VerdictStats;
use crate::types::{FailedClassification, WalletVerdict};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use rusqlite::{Row, ToSql, params, params_from_iter};
use std::str::FromStr;

pub struct VerdictRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> VerdictRepository<'a> {
    const UPSERT_VERDICT: &'static str = "INSERT OR REPLACE INTO verdicts (
            transaction_hash, wallet, block_number, claimed, claimed_raw,
            buy_count, sell_count, total_buy_wei, total_sell_wei, suspicious
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

    const CLEAR_FAILURE: &'static str =
        "DELETE FROM failed_classifications WHERE transaction_hash = ?1 AND wallet = ?2";

    const UPSERT_FAILURE: &'static str = "INSERT OR REPLACE INTO failed_classifications (
            transaction_hash, wallet, block_number, error
        ) VALUES (?1, ?2, ?3, ?4)";

    const SELECT_VERDICT: &'static str = "SELECT transaction_hash, wallet, block_number, claimed,
            claimed_raw, buy_count, sell_count, total_buy_wei, total_sell_wei FROM verdicts";

    const SELECT_FAILURE: &'static str =
        "SELECT transaction_hash, wallet, block_number, error FROM failed_classifications";

    const SELECT_SUSPICIOUS_CLAIMED: &'static str =
        "SELECT claimed_raw FROM verdicts WHERE suspicious = 1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Store verdicts, replacing earlier rows for the same claim and clearing
    /// any failure recorded for it by a previous run.
    pub fn insert_batch(&self, verdicts: &[WalletVerdict]) -> rusqlite::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut upsert = tx.prepare(Self::UPSERT_VERDICT)?;
            let mut clear = tx.prepare(Self::CLEAR_FAILURE)?;

            for verdict in verdicts {
                let tx_hash = format!("{:?}", verdict.tx_hash);
                let wallet = format!("{:?}", verdict.wallet);
                count += upsert.execute(params![
                    tx_hash,
                    wallet,
                    verdict.block_number,
                    verdict.claimed,
                    verdict.claimed_raw.to_string(),
                    verdict.buy_count,
                    verdict.sell_count,
                    verdict.total_buy_wei.to_string(),
                    verdict.total_sell_wei.to_string(),
                    verdict.is_suspicious(),
                ])?;
                clear.execute(params![tx_hash, wallet])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn insert_failures(&self, failures: &[FailedClassification]) -> rusqlite::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(Self::UPSERT_FAILURE)?;
            for failure in failures {
                count += stmt.execute(params![
                    format!("{:?}", failure.tx_hash),
                    format!("{:?}", failure.wallet),
                    failure.block_number,
                    failure.error,
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn query_suspicious(
        &self,
        block_range: Option<(u64, u64)>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletVerdict>> {
        let mut conditions = vec!["suspicious = 1"];
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some((start, end)) = block_range {
            conditions.push("block_number >= ?");
            params.push(Box::new(start));
            conditions.push("block_number <= ?");
            params.push(Box::new(end));
        }

        self.execute_paginated_query(conditions, params, limit, offset)
    }

    pub fn get_wallet(&self, wallet: &Address) -> Result<Vec<WalletVerdict>> {
        let conditions = vec!["wallet = ?"];
        let params: Vec<Box<dyn ToSql>> = vec![Box::new(format!("{wallet:?}"))];

        self.execute_paginated_query(conditions, params, i64::MAX as usize, 0)
    }

    pub fn get_failures(&self, limit: usize, offset: usize) -> Result<Vec<FailedClassification>> {
        let query = format!(
            "{} ORDER BY block_number, wallet LIMIT {limit} OFFSET {offset}",
            Self::SELECT_FAILURE
        );
        let mut stmt = self.conn.prepare(&query)?;
        let failures = stmt
            .query_map([], Self::row_to_failure)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(failures)
    }

    pub fn get_statistics(&self) -> Result<VerdictStats> {
        let total_verdicts: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM verdicts", [], |row| row.get(0))?;

        let suspicious_wallets: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT wallet) FROM verdicts WHERE suspicious = 1",
            [],
            |row| row.get(0),
        )?;

        let failed_classifications: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM failed_classifications", [], |row| {
                    row.get(0)
                })?;

        let (earliest_block, latest_block): (Option<u64>, Option<u64>) = self.conn.query_row(
            "SELECT MIN(block_number), MAX(block_number) FROM verdicts",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(Self::SELECT_SUSPICIOUS_CLAIMED)?;
        let claimed = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VerdictStats {
            total_verdicts,
            suspicious_wallets,
            suspicious_claimed: Self::sum_values(claimed)?,
            failed_classifications,
            earliest_block,
            latest_block,
        })
    }

    fn execute_paginated_query(
        &self,
        conditions: Vec<&str>,
        params: Vec<Box<dyn ToSql>>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletVerdict>> {
        let mut query = Self::SELECT_VERDICT.to_string();

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(&format!(
            " ORDER BY block_number, transaction_hash LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let verdicts = stmt
            .query_map(params_from_iter(params), Self::row_to_verdict)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(verdicts)
    }

    fn row_to_verdict(row: &Row) -> rusqlite::Result<WalletVerdict> {
        let buy_count: u32 = row.get(5)?;
        let sell_count: u32 = row.get(6)?;

        Ok(WalletVerdict {
            tx_hash: parse_column::<B256>(row, 0)?,
            wallet: parse_column::<Address>(row, 1)?,
            block_number: row.get(2)?,
            claimed: row.get(3)?,
            claimed_raw: parse_column::<U256>(row, 4)?,
            has_buy: buy_count > 0,
            has_sell: sell_count > 0,
            buy_count,
            sell_count,
            total_buy_wei: parse_column::<U256>(row, 7)?,
            total_sell_wei: parse_column::<U256>(row, 8)?,
        })
    }

    fn row_to_failure(row: &Row) -> rusqlite::Result<FailedClassification> {
        Ok(FailedClassification {
            tx_hash: parse_column::<B256>(row, 0)?,
            wallet: parse_column::<Address>(row, 1)?,
            block_number: row.get(2)?,
            error: row.get(3)?,
        })
    }

    fn sum_values(values: Vec<String>) -> Result<U256> {
        let mut total = U256::ZERO;
        for value_str in values {
            let value = U256::from_str(&value_str)
                .map_err(|_| anyhow::anyhow!("Invalid value format in database: {}", value_str))?;
            total = total
                .checked_add(value)
                .ok_or_else(|| anyhow::anyhow!("Overflow in sum calculation"))?;
        }
        Ok(total)
    }
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.get::<_, String>(idx)?.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::test_support::{claim, ether};
    use crate::types::{ActivityEvent, Role};

    fn buy(price_ether: u64) -> ActivityEvent {
        ActivityEvent {
            price: ether(price_ether),
            role: Role::Buyer,
        }
    }

    #[test]
    fn test_verdicts_round_trip_through_storage() {
        let db = Database::in_memory().unwrap();
        let repo = VerdictRepository::new(&db.conn);

        let quiet = WalletVerdict::new(&claim(0x01, 1000, 1, 100), &[], &[]);
        let trader = WalletVerdict::new(&claim(0x02, 250, 2, 101), &[buy(2), buy(3)], &[]);
        assert_eq!(repo.insert_batch(&[quiet.clone(), trader.clone()]).unwrap(), 2);

        assert_eq!(repo.query_suspicious(None, 10, 0).unwrap(), vec![quiet]);
        assert_eq!(repo.get_wallet(&trader.wallet).unwrap(), vec![trader]);
    }

    #[test]
    fn test_rerun_replaces_rows_and_clears_failures() {
        let db = Database::in_memory().unwrap();
        let repo = VerdictRepository::new(&db.conn);
        let claim = claim(0x01, 10, 7, 500);

        repo.insert_failures(&[FailedClassification {
            wallet: claim.recipient,
            tx_hash: claim.tx_hash,
            block_number: claim.block_number,
            error: "timed out".to_string(),
        }])
        .unwrap();
        assert_eq!(repo.get_failures(10, 0).unwrap().len(), 1);

        let verdict = WalletVerdict::new(&claim, &[], &[]);
        repo.insert_batch(std::slice::from_ref(&verdict)).unwrap();
        repo.insert_batch(&[verdict]).unwrap();

        let stats = repo.get_statistics().unwrap();
        assert_eq!(stats.total_verdicts, 1);
        assert_eq!(stats.failed_classifications, 0);
        assert!(repo.get_failures(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_statistics_sum_suspicious_claims() {
        let db = Database::in_memory().unwrap();
        let repo = VerdictRepository::new(&db.conn);

        repo.insert_batch(&[
            WalletVerdict::new(&claim(0x01, 1000, 1, 100), &[], &[]),
            WalletVerdict::new(&claim(0x02, 500, 2, 300), &[], &[]),
            WalletVerdict::new(&claim(0x03, 70, 3, 200), &[buy(1)], &[]),
        ])
        .unwrap();

        let stats = repo.get_statistics().unwrap();
        assert_eq!(stats.total_verdicts, 3);
        assert_eq!(stats.suspicious_wallets, 2);
        assert_eq!(stats.suspicious_claimed, ether(1500));
        assert_eq!(stats.earliest_block, Some(100));
        assert_eq!(stats.latest_block, Some(300));
    }

    #[test]
    fn test_suspicious_query_filters_by_block_range() {
        let db = Database::in_memory().unwrap();
        let repo = VerdictRepository::new(&db.conn);

        repo.insert_batch(&[
            WalletVerdict::new(&claim(0x01, 1, 1, 100), &[], &[]),
            WalletVerdict::new(&claim(0x02, 1, 2, 200), &[], &[]),
            WalletVerdict::new(&claim(0x03, 1, 3, 300), &[], &[]),
        ])
        .unwrap();

        let found = repo.query_suspicious(Some((150, 300)), 10, 0).unwrap();
        let blocks: Vec<u64> = found.iter().map(|v| v.block_number).collect();
        assert_eq!(blocks, vec![200, 300]);

        let page = repo.query_suspicious(None, 1, 1).unwrap();
        assert_eq!(page[0].block_number, 200);
    }
}
