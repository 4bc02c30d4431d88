use super::models::PoolRecord;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use rusqlite::{Row, params};
use std::str::FromStr;

pub struct PoolRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> PoolRepository<'a> {
    // Pool payloads for a given address are deterministic, so replaying the
    // same creation event may overwrite with identical values.
    const UPSERT_POOL: &'static str = "INSERT INTO pools (
            address, investigator, threshold, min_unlock_amount,
            deadline, payload, created_block, transaction_hash, factory_address
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(address) DO UPDATE SET
            investigator = excluded.investigator,
            threshold = excluded.threshold,
            min_unlock_amount = excluded.min_unlock_amount,
            deadline = excluded.deadline,
            payload = excluded.payload,
            created_block = excluded.created_block,
            transaction_hash = excluded.transaction_hash,
            factory_address = excluded.factory_address";

    const SELECT_POOLS: &'static str = "SELECT address, investigator, threshold,
            min_unlock_amount, deadline, payload, created_block,
            transaction_hash, factory_address
        FROM pools ORDER BY created_block";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, pool: &PoolRecord) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_POOL,
            params![
                format!("{:?}", pool.address),
                format!("{:?}", pool.investigator),
                pool.threshold.to_string(),
                pool.min_unlock_amount.to_string(),
                pool.deadline.to_string(),
                pool.payload.to_string(),
                pool.created_block,
                format!("{:?}", pool.transaction_hash),
                format!("{:?}", pool.factory_address),
            ],
        )?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<PoolRecord>> {
        let mut stmt = self.conn.prepare(Self::SELECT_POOLS)?;
        let pools = stmt
            .query_map([], Self::row_to_pool)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pools)
    }

    fn row_to_pool(row: &Row) -> rusqlite::Result<PoolRecord> {
        Ok(PoolRecord {
            address: parse_column::<Address>(row, 0)?,
            investigator: parse_column::<Address>(row, 1)?,
            threshold: parse_column::<U256>(row, 2)?,
            min_unlock_amount: parse_column::<U256>(row, 3)?,
            deadline: parse_column::<U256>(row, 4)?,
            payload: parse_column::<Bytes>(row, 5)?,
            created_block: row.get(6)?,
            transaction_hash: parse_column::<B256>(row, 7)?,
            factory_address: parse_column::<Address>(row, 8)?,
        })
    }
}

pub(super) fn parse_column<T>(row: &Row, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&row.get::<_, String>(index)?).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}
