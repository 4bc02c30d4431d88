use crate::events::{Contributed, PoolCreated, decode_contribution, decode_pool_created};
use crate::registry::{WatchEntry, WatchRegistry};
use crate::repository::{ContributionRecord, LedgerStore, PoolRecord};
use crate::rpc::ChainClient;
use alloy::sol_types::SolEvent;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use tracing::{debug, info};

// Most public RPCs allow up to 1k logs per request, empirically proven
pub const BATCH_SIZE: u64 = 1000;

/// Scans one watched address's unscanned block range and persists what it
/// finds. Watermarks only move after the whole batch is durably stored
/// (scan-then-advance); on any error the watermark stays put and the same
/// range is retried next cycle, relying on deterministic record keys to make
/// the replay idempotent.
pub struct Scanner<'a, C, S> {
    client: &'a C,
    store: &'a S,
    registry: &'a WatchRegistry,
    factory_address: Address,
}

impl<'a, C: ChainClient, S: LedgerStore> Scanner<'a, C, S> {
    pub fn new(
        client: &'a C,
        store: &'a S,
        registry: &'a WatchRegistry,
        factory_address: Address,
    ) -> Self {
        Scanner {
            client,
            store,
            registry,
            factory_address,
        }
    }

    /// Scans the factory for `PoolCreated` events up to `tip`. Each
    /// discovered pool gets a persisted record and a registry entry seeded
    /// just below its creation block, so the pool's own history (which may
    /// start in its creation block) is scanned from the beginning.
    /// Returns the number of pools discovered.
    pub async fn scan_factory(&self, tip: u64) -> Result<usize> {
        let watermark = self
            .registry
            .watermark(self.factory_address)
            .context("factory address is not registered")?;

        let mut discovered = 0;
        let mut from = watermark + 1;

        while from <= tip {
            let to = (from + BATCH_SIZE - 1).min(tip);
            debug!("Scanning factory blocks {} to {}", from, to);

            let logs = self
                .client
                .logs(self.factory_address, PoolCreated::SIGNATURE_HASH, from, to)
                .await?;

            for log in &logs {
                let Some(event) = decode_pool_created(log) else {
                    continue;
                };

                let record = PoolRecord::from_event(&event, self.factory_address);
                self.store.upsert_pool(&record)?;
                self.registry
                    .register(event.pool, event.block_number.saturating_sub(1));
                discovered += 1;

                info!(
                    "Discovered pool {:?} created by {:?} at block {}",
                    event.pool, event.investigator, event.block_number
                );
            }

            // Everything in [from, to] is persisted, safe to move forward.
            self.store.set_cursor(&self.factory_address, to)?;
            self.registry.advance(self.factory_address, to)?;
            from = to + 1;
        }

        Ok(discovered)
    }

    /// Scans one pool for `Contributed` events up to `tip`. Returns the
    /// number of contribution rows persisted (replays excluded).
    pub async fn scan_pool(&self, entry: &WatchEntry, tip: u64) -> Result<usize> {
        let mut persisted = 0;
        let mut from = entry.last_scanned_block + 1;

        while from <= tip {
            let to = (from + BATCH_SIZE - 1).min(tip);
            debug!("Scanning pool {:?} blocks {} to {}", entry.address, from, to);

            let logs = self
                .client
                .logs(entry.address, Contributed::SIGNATURE_HASH, from, to)
                .await?;

            let contributions: Vec<ContributionRecord> = logs
                .iter()
                .filter_map(decode_contribution)
                .map(|event| ContributionRecord::from_event(&event))
                .collect();

            if !contributions.is_empty() {
                persisted += self.store.upsert_contributions(&contributions)?;
            }

            self.store.set_cursor(&entry.address, to)?;
            self.registry.advance(entry.address, to)?;
            from = to + 1;
        }

        if persisted > 0 {
            info!(
                "Persisted {} contributions for pool {:?}",
                persisted, entry.address
            );
        }

        Ok(persisted)
    }
}
