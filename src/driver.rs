use crate::deployment::find_deployment_block;
use crate::registry::WatchRegistry;
use crate::repository::LedgerStore;
use crate::rpc::ChainClient;
use crate::scanner::Scanner;
use alloy_primitives::Address;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Rebuilds the watch registry from persisted state. Every known pool is
/// registered at its persisted cursor, or just below its creation block when
/// no cursor exists yet, so contributions emitted between creation and this
/// startup are backfilled. The factory falls back to its deployment block,
/// found by bytecode binary search, on the very first run.
pub async fn bootstrap_registry<C: ChainClient, S: LedgerStore>(
    client: &C,
    store: &S,
    factory_address: Address,
) -> Result<WatchRegistry> {
    let registry = WatchRegistry::new();

    let factory_watermark = match store.cursor(&factory_address)? {
        Some(block) => block,
        None => {
            let tip = client.latest_block().await?;
            find_deployment_block(client, factory_address, tip)
                .await?
                .saturating_sub(1)
        }
    };
    registry.register(factory_address, factory_watermark);

    let pools = store.pools()?;
    for pool in &pools {
        let watermark = store
            .cursor(&pool.address)?
            .unwrap_or_else(|| pool.created_block.saturating_sub(1));
        registry.register(pool.address, watermark);
    }

    info!(
        "Watch registry rebuilt: factory at block {}, {} known pool(s)",
        factory_watermark,
        pools.len()
    );

    Ok(registry)
}

/// Top-level scheduling loop. Each cycle scans the factory first, so pools
/// discovered this cycle are already in the registry when the per-pool pass
/// snapshots it, then scans every registered pool up to the same tip.
pub struct Driver<'a, C, S> {
    client: &'a C,
    store: &'a S,
    registry: &'a WatchRegistry,
    factory_address: Address,
    poll_interval: Duration,
}

impl<'a, C: ChainClient, S: LedgerStore> Driver<'a, C, S> {
    pub fn new(
        client: &'a C,
        store: &'a S,
        registry: &'a WatchRegistry,
        factory_address: Address,
        poll_interval: Duration,
    ) -> Self {
        Driver {
            client,
            store,
            registry,
            factory_address,
            poll_interval,
        }
    }

    /// Runs scan cycles until `shutdown` resolves. The signal is only
    /// checked between cycles: an in-flight cycle always reaches its
    /// persist-then-advance point, so no range is left half-applied.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            if let Err(e) = self.run_cycle().await {
                warn!("Scan cycle failed: {:#}, retrying next cycle", e);
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, exiting after completed cycle");
                    return Ok(());
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// One full scan cycle against a single tip reading. Per-pool failures
    /// are isolated: a pool whose scan errors keeps its watermark and is
    /// retried next cycle while its siblings still get scanned.
    pub async fn run_cycle(&self) -> Result<()> {
        let tip = self.client.latest_block().await?;
        let scanner = Scanner::new(self.client, self.store, self.registry, self.factory_address);

        if let Err(e) = scanner.scan_factory(tip).await {
            warn!("Factory scan failed: {:#}, retrying next cycle", e);
        }

        for entry in self.registry.snapshot() {
            if entry.address == self.factory_address {
                continue;
            }
            if entry.last_scanned_block >= tip {
                continue;
            }

            if let Err(e) = scanner.scan_pool(&entry, tip).await {
                warn!(
                    "Scan failed for pool {:?}: {:#}, retrying next cycle",
                    entry.address, e
                );
            }
        }

        Ok(())
    }
}
