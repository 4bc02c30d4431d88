use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

/// Persisted watermarks, one row per watched address. Lets a restart resume
/// exactly where the previous run stopped instead of re-seeding from the tip.
pub struct CursorRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> CursorRepository<'a> {
    const UPSERT_CURSOR: &'static str = "INSERT INTO scan_cursors (address, last_scanned_block)
         VALUES (?1, ?2)
         ON CONFLICT(address) DO UPDATE SET last_scanned_block = excluded.last_scanned_block";

    const GET_CURSOR: &'static str =
        "SELECT last_scanned_block FROM scan_cursors WHERE address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, address: &Address) -> Result<Option<u64>> {
        let block = self
            .conn
            .query_row(Self::GET_CURSOR, params![format!("{address:?}")], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(block)
    }

    pub fn set(&self, address: &Address, block_number: u64) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_CURSOR,
            params![format!("{address:?}"), block_number],
        )?;
        Ok(())
    }
}
