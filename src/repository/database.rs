use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        // One row per claims contract; last fully processed claim block
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS scan_progress (
                claims_contract TEXT PRIMARY KEY,
                last_processed_block INTEGER NOT NULL
            )",
            [],
        )?;

        // A wallet can claim more than once, so key on the claim transaction
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS verdicts (
                transaction_hash TEXT NOT NULL,
                wallet TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                claimed TEXT NOT NULL,
                claimed_raw TEXT NOT NULL,
                buy_count INTEGER NOT NULL,
                sell_count INTEGER NOT NULL,
                total_buy_wei TEXT NOT NULL,
                total_sell_wei TEXT NOT NULL,
                suspicious INTEGER NOT NULL,
                PRIMARY KEY (transaction_hash, wallet)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS failed_classifications (
                transaction_hash TEXT NOT NULL,
                wallet TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                error TEXT NOT NULL,
                PRIMARY KEY (transaction_hash, wallet)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_verdicts_wallet
             ON verdicts(wallet)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_verdicts_suspicious
             ON verdicts(suspicious, block_number)",
            [],
        )?;

        Ok(())
    }
}
