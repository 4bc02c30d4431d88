pub mod contribution_repository;
pub mod cursor_repository;
pub mod database;
pub mod models;
pub mod pool_repository;

pub use contribution_repository::ContributionRepository;
pub use cursor_repository::CursorRepository;
pub use database::Database;
pub use models::{ContributionRecord, PoolRecord};
pub use pool_repository::PoolRepository;

use alloy_primitives::Address;
use anyhow::Result;

/// Seam between the scanner and whatever actually stores indexed state.
/// Production uses the SQLite-backed [`Database`]; tests substitute failing
/// or recording implementations.
pub trait LedgerStore {
    fn upsert_pool(&self, pool: &PoolRecord) -> Result<()>;

    /// Upserts a batch of contributions as a unit; returns how many rows were
    /// new. Must be idempotent under replay of the same batch.
    fn upsert_contributions(&self, contributions: &[ContributionRecord]) -> Result<usize>;

    fn pools(&self) -> Result<Vec<PoolRecord>>;

    fn cursor(&self, address: &Address) -> Result<Option<u64>>;

    fn set_cursor(&self, address: &Address, block_number: u64) -> Result<()>;
}

impl LedgerStore for Database {
    fn upsert_pool(&self, pool: &PoolRecord) -> Result<()> {
        PoolRepository::new(&self.conn).upsert(pool)
    }

    fn upsert_contributions(&self, contributions: &[ContributionRecord]) -> Result<usize> {
        ContributionRepository::new(&self.conn).upsert_batch(contributions)
    }

    fn pools(&self) -> Result<Vec<PoolRecord>> {
        PoolRepository::new(&self.conn).all()
    }

    fn cursor(&self, address: &Address) -> Result<Option<u64>> {
        CursorRepository::new(&self.conn).get(address)
    }

    fn set_cursor(&self, address: &Address, block_number: u64) -> Result<()> {
        CursorRepository::new(&self.conn).set(address, block_number)
    }
}
