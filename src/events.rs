use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, Bytes, U256};
use tracing::warn;

sol! {
    event PoolCreated(
        address indexed investigator,
        address indexed pool,
        uint256 threshold,
        uint256 minUnlockAmount,
        uint256 deadline,
        bytes payload
    );

    event Contributed(address indexed contributor, uint256 amount);
}

/// Decoded `PoolCreated` log emitted by the factory, with its on-chain
/// position attached. Amounts stay as `U256` end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreatedEvent {
    pub investigator: Address,
    pub pool: Address,
    pub threshold: U256,
    pub min_unlock_amount: U256,
    pub deadline: U256,
    pub payload: Bytes,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// Decoded `Contributed` log emitted by one pool contract. The pool address
/// comes from the log itself since the event body does not carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionEvent {
    pub pool: Address,
    pub contributor: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

/// Decodes a raw log into a `PoolCreatedEvent`. Returns `None` both for logs
/// of a different schema (silently, this is expected when filters overlap)
/// and for logs that match the signature but fail to decode (warned, since a
/// malformed log will not become well-formed on retry).
pub fn decode_pool_created(log: &Log) -> Option<PoolCreatedEvent> {
    if log.topics().first() != Some(&PoolCreated::SIGNATURE_HASH) {
        return None;
    }

    let decoded = match PoolCreated::decode_raw_log(log.topics(), &log.data().data) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                "Skipping malformed PoolCreated log in block {:?}: {}",
                log.block_number, e
            );
            return None;
        }
    };

    let (block_number, tx_hash) = log_position(log)?;

    Some(PoolCreatedEvent {
        investigator: decoded.investigator,
        pool: decoded.pool,
        threshold: decoded.threshold,
        min_unlock_amount: decoded.minUnlockAmount,
        deadline: decoded.deadline,
        payload: decoded.payload,
        block_number,
        tx_hash,
    })
}

/// Decodes a raw log into a `ContributionEvent`, same skip semantics as
/// `decode_pool_created`.
pub fn decode_contribution(log: &Log) -> Option<ContributionEvent> {
    if log.topics().first() != Some(&Contributed::SIGNATURE_HASH) {
        return None;
    }

    let decoded = match Contributed::decode_raw_log(log.topics(), &log.data().data) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                "Skipping malformed Contributed log in block {:?}: {}",
                log.block_number, e
            );
            return None;
        }
    };

    let (block_number, tx_hash) = log_position(log)?;
    let Some(log_index) = log.log_index else {
        warn!("Skipping Contributed log without a log index (pending log?)");
        return None;
    };

    Some(ContributionEvent {
        pool: log.address(),
        contributor: decoded.contributor,
        amount: decoded.amount,
        block_number,
        log_index,
        tx_hash,
    })
}

// Logs from pending blocks have no position yet; we only ever scan mined
// ranges, so treat a missing position as malformed.
fn log_position(log: &Log) -> Option<(u64, B256)> {
    match (log.block_number, log.transaction_hash) {
        (Some(block), Some(hash)) => Some((block, hash)),
        _ => {
            warn!("Skipping log without block number or transaction hash");
            None
        }
    }
}
