use crate::rpc::ChainClient;
use alloy_primitives::Address;
use anyhow::Result;
use tracing::info;

/// Binary search over `eth_getCode` for the first block where `address` has
/// bytecode. Used once, when no persisted cursor exists for the factory, so
/// the first run backfills from the factory's whole history.
pub async fn find_deployment_block<C: ChainClient>(
    client: &C,
    address: Address,
    latest_block: u64,
) -> Result<u64> {
    info!("Searching for deployment block of contract {:?}", address);

    let code = client.code_at(address, latest_block).await?;
    if code.is_empty() {
        anyhow::bail!("Address {:?} is not a deployed contract", address);
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = (left + right) / 2;

        let code = client.code_at(address, mid).await?;

        if code.is_empty() {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract deployed at block {}", left);
    Ok(left)
}
