use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS pools (
                address TEXT PRIMARY KEY,
                investigator TEXT NOT NULL,
                threshold TEXT NOT NULL,
                min_unlock_amount TEXT NOT NULL,
                deadline TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_block INTEGER NOT NULL,
                transaction_hash TEXT NOT NULL,
                factory_address TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS contributions (
                pool_address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                log_index INTEGER NOT NULL,
                contributor TEXT NOT NULL,
                amount TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                PRIMARY KEY (pool_address, block_number, log_index),
                FOREIGN KEY (pool_address) REFERENCES pools(address)
            )",
            [],
        )?;

        // Last fully scanned block per watched address (factory and pools).
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS scan_cursors (
                address TEXT PRIMARY KEY,
                last_scanned_block INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contributions_contributor
             ON contributions(contributor)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contributions_block_number
             ON contributions(block_number)",
            [],
        )?;

        Ok(())
    }
}
