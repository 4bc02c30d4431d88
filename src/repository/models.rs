use crate::events::{ContributionEvent, PoolCreatedEvent};
use alloy_primitives::{Address, B256, Bytes, U256};

/// One row of the `pools` table, keyed by the pool contract address (globally
/// unique on-chain, so it doubles as the idempotency key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRecord {
    pub address: Address,
    pub investigator: Address,
    pub threshold: U256,
    pub min_unlock_amount: U256,
    pub deadline: U256,
    pub payload: Bytes,
    pub created_block: u64,
    pub transaction_hash: B256,
    pub factory_address: Address,
}

impl PoolRecord {
    pub fn from_event(event: &PoolCreatedEvent, factory_address: Address) -> Self {
        PoolRecord {
            address: event.pool,
            investigator: event.investigator,
            threshold: event.threshold,
            min_unlock_amount: event.min_unlock_amount,
            deadline: event.deadline,
            payload: event.payload.clone(),
            created_block: event.block_number,
            transaction_hash: event.tx_hash,
            factory_address,
        }
    }
}

/// One row of the `contributions` table. Keyed by
/// `(pool_address, block_number, log_index)` so that re-scanning an
/// overlapping block range upserts the same row instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionRecord {
    pub pool_address: Address,
    pub contributor: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl ContributionRecord {
    pub fn from_event(event: &ContributionEvent) -> Self {
        ContributionRecord {
            pool_address: event.pool,
            contributor: event.contributor,
            amount: event.amount,
            block_number: event.block_number,
            log_index: event.log_index,
            transaction_hash: event.tx_hash,
        }
    }
}
