use super::models::ContributionRecord;
use super::pool_repository::parse_column;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use rusqlite::{Row, params};

pub struct ContributionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ContributionRepository<'a> {
    // The key is deterministic per event, so a replayed row is identical to
    // the stored one and may simply be ignored.
    const UPSERT_CONTRIBUTION: &'static str = "INSERT OR IGNORE INTO contributions (
            pool_address, block_number, log_index,
            contributor, amount, transaction_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    const SELECT_CONTRIBUTIONS: &'static str = "SELECT pool_address, block_number,
            log_index, contributor, amount, transaction_hash
        FROM contributions";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Inserts a batch inside one transaction so a range's events land as a
    /// unit. Returns the number of rows that were actually new.
    pub fn upsert_batch(&self, contributions: &[ContributionRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(Self::UPSERT_CONTRIBUTION)?;

            for contribution in contributions {
                count += stmt.execute(params![
                    format!("{:?}", contribution.pool_address),
                    contribution.block_number,
                    contribution.log_index,
                    format!("{:?}", contribution.contributor),
                    contribution.amount.to_string(),
                    format!("{:?}", contribution.transaction_hash),
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn for_pool(&self, pool_address: &Address) -> Result<Vec<ContributionRecord>> {
        let query = format!(
            "{} WHERE pool_address = ?1 ORDER BY block_number, log_index",
            Self::SELECT_CONTRIBUTIONS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let contributions = stmt
            .query_map(
                params![format!("{pool_address:?}")],
                Self::row_to_contribution,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contributions)
    }

    pub fn count(&self) -> Result<usize> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM contributions", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_contribution(row: &Row) -> rusqlite::Result<ContributionRecord> {
        Ok(ContributionRecord {
            pool_address: parse_column::<Address>(row, 0)?,
            block_number: row.get(1)?,
            log_index: row.get(2)?,
            contributor: parse_column::<Address>(row, 3)?,
            amount: parse_column::<U256>(row, 4)?,
            transaction_hash: parse_column::<B256>(row, 5)?,
        })
    }
}
