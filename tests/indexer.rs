use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, Bytes, U256, address};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use pool_indexer::driver::{Driver, bootstrap_registry};
use pool_indexer::events::{Contributed, PoolCreated};
use pool_indexer::registry::WatchRegistry;
use pool_indexer::repository::{
    ContributionRecord, ContributionRepository, Database, LedgerStore, PoolRecord, PoolRepository,
};
use pool_indexer::rpc::ChainClient;
use pool_indexer::scanner::Scanner;

const FACTORY: Address = address!("0x00000000000000000000000000000000000000ff");
const POOL_ABC: Address = address!("0x0000000000000000000000000000000000000abc");
const POOL_DEF: Address = address!("0x0000000000000000000000000000000000000def");
const INVESTIGATOR: Address = address!("0x0000000000000000000000000000000000000011");
const CONTRIBUTOR: Address = address!("0x0000000000000000000000000000000000000001");

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-memory chain: a tip, a flat list of logs, and a set of addresses whose
/// log queries fail (to simulate RPC outages for specific contracts).
#[derive(Default)]
struct MockChain {
    tip: AtomicU64,
    logs: Mutex<Vec<Log>>,
    failing: Mutex<HashSet<Address>>,
    deployment_block: u64,
}

impl MockChain {
    fn with_tip(tip: u64) -> Self {
        let chain = MockChain::default();
        chain.tip.store(tip, Ordering::Relaxed);
        chain
    }

    fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::Relaxed);
    }

    fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    fn fail_address(&self, address: Address) {
        self.failing.lock().unwrap().insert(address);
    }

    fn heal_address(&self, address: Address) {
        self.failing.lock().unwrap().remove(&address);
    }
}

impl ChainClient for MockChain {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.tip.load(Ordering::Relaxed))
    }

    async fn logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        if self.failing.lock().unwrap().contains(&address) {
            anyhow::bail!("simulated RPC failure for {address:?}");
        }

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                log.address() == address
                    && log.topics().first() == Some(&topic0)
                    && log
                        .block_number
                        .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn code_at(&self, _address: Address, block_number: u64) -> Result<Bytes> {
        if block_number >= self.deployment_block {
            Ok(Bytes::from(vec![0x60, 0x80]))
        } else {
            Ok(Bytes::new())
        }
    }
}

/// Wraps the real store but fails contribution upserts on demand.
struct FlakyStore {
    inner: Database,
    fail_contributions: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        FlakyStore {
            inner: Database::in_memory().unwrap(),
            fail_contributions: AtomicBool::new(false),
        }
    }
}

impl LedgerStore for FlakyStore {
    fn upsert_pool(&self, pool: &PoolRecord) -> Result<()> {
        self.inner.upsert_pool(pool)
    }

    fn upsert_contributions(&self, contributions: &[ContributionRecord]) -> Result<usize> {
        if self.fail_contributions.load(Ordering::Relaxed) {
            anyhow::bail!("simulated store outage");
        }
        self.inner.upsert_contributions(contributions)
    }

    fn pools(&self) -> Result<Vec<PoolRecord>> {
        self.inner.pools()
    }

    fn cursor(&self, address: &Address) -> Result<Option<u64>> {
        self.inner.cursor(address)
    }

    fn set_cursor(&self, address: &Address, block_number: u64) -> Result<()> {
        self.inner.set_cursor(address, block_number)
    }
}

fn tx_hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

fn pool_created_log(pool: Address, block: u64, log_index: u64) -> Log {
    let event = PoolCreated {
        investigator: INVESTIGATOR,
        pool,
        threshold: U256::from(1_000u64),
        minUnlockAmount: U256::from(100u64),
        deadline: U256::from(1_700_000_000u64),
        payload: Bytes::from(vec![0xca, 0xfe]),
    };
    let data = event.encode_log_data();
    Log {
        inner: alloy_primitives::Log::new_unchecked(FACTORY, data.topics().to_vec(), data.data),
        block_number: Some(block),
        transaction_hash: Some(tx_hash(0xaa)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

fn contribution_log(pool: Address, amount: u64, block: u64, log_index: u64) -> Log {
    let event = Contributed {
        contributor: CONTRIBUTOR,
        amount: U256::from(amount),
    };
    let data = event.encode_log_data();
    Log {
        inner: alloy_primitives::Log::new_unchecked(pool, data.topics().to_vec(), data.data),
        block_number: Some(block),
        transaction_hash: Some(tx_hash(0xbb)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

fn registry_with(factory_watermark: u64, pools: &[(Address, u64)]) -> WatchRegistry {
    let registry = WatchRegistry::new();
    registry.register(FACTORY, factory_watermark);
    for (address, watermark) in pools {
        registry.register(*address, *watermark);
    }
    registry
}

// Spec scenario: pool created at block 95 with tip 100, then a contribution
// at block 105 picked up by the next cycle at tip 110.
#[tokio::test]
async fn discovers_pool_then_indexes_contribution() {
    let chain = MockChain::with_tip(100);
    chain.push_log(pool_created_log(POOL_ABC, 95, 0));

    let db = Database::in_memory().unwrap();
    let registry = registry_with(90, &[]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();

    let pools = PoolRepository::new(&db.conn).all().unwrap();
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].address, POOL_ABC);
    assert_eq!(pools[0].investigator, INVESTIGATOR);
    assert_eq!(pools[0].created_block, 95);
    assert_eq!(pools[0].factory_address, FACTORY);
    assert_eq!(registry.watermark(POOL_ABC), Some(100));
    assert_eq!(db.cursor(&POOL_ABC).unwrap(), Some(100));

    chain.set_tip(110);
    chain.push_log(contribution_log(POOL_ABC, 50, 105, 7));

    driver.run_cycle().await.unwrap();

    let rows = ContributionRepository::new(&db.conn)
        .for_pool(&POOL_ABC)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pool_address, POOL_ABC);
    assert_eq!(rows[0].block_number, 105);
    assert_eq!(rows[0].log_index, 7);
    assert_eq!(rows[0].amount, U256::from(50u64));
    assert_eq!(registry.watermark(POOL_ABC), Some(110));
}

// A pool created and contributed to below the same tip must yield the
// contribution within the same cycle, not get silently lost.
#[tokio::test]
async fn contribution_in_creation_cycle_is_not_lost() {
    let chain = MockChain::with_tip(100);
    chain.push_log(pool_created_log(POOL_ABC, 95, 0));
    chain.push_log(contribution_log(POOL_ABC, 75, 95, 1));
    chain.push_log(contribution_log(POOL_ABC, 25, 96, 0));

    let db = Database::in_memory().unwrap();
    let registry = registry_with(90, &[]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();

    let rows = ContributionRepository::new(&db.conn)
        .for_pool(&POOL_ABC)
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].block_number, 95);
    assert_eq!(rows[1].block_number, 96);
}

// Spec scenario: a chain failure at watermark 50 / tip 60 leaves the
// watermark untouched; the retry at tip 70 covers the full combined range.
#[tokio::test]
async fn failed_scan_retries_full_range_next_cycle() {
    let chain = MockChain::with_tip(60);
    chain.push_log(contribution_log(POOL_DEF, 10, 55, 0));
    chain.push_log(contribution_log(POOL_DEF, 20, 65, 0));
    chain.fail_address(POOL_DEF);

    let db = Database::in_memory().unwrap();
    let registry = registry_with(60, &[(POOL_DEF, 50)]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();

    assert_eq!(ContributionRepository::new(&db.conn).count().unwrap(), 0);
    assert_eq!(registry.watermark(POOL_DEF), Some(50));
    assert_eq!(db.cursor(&POOL_DEF).unwrap(), None);

    chain.heal_address(POOL_DEF);
    chain.set_tip(70);

    driver.run_cycle().await.unwrap();

    let rows = ContributionRepository::new(&db.conn)
        .for_pool(&POOL_DEF)
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].block_number, 55);
    assert_eq!(rows[1].block_number, 65);
    assert_eq!(registry.watermark(POOL_DEF), Some(70));
}

// One pool's RPC outage must not stop its siblings from being scanned.
#[tokio::test]
async fn failing_pool_does_not_abort_sibling_scans() {
    let chain = MockChain::with_tip(100);
    chain.push_log(contribution_log(POOL_ABC, 10, 95, 0));
    chain.push_log(contribution_log(POOL_DEF, 20, 96, 0));
    chain.fail_address(POOL_ABC);

    let db = Database::in_memory().unwrap();
    let registry = registry_with(100, &[(POOL_ABC, 90), (POOL_DEF, 90)]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();

    assert_eq!(registry.watermark(POOL_ABC), Some(90));
    assert_eq!(registry.watermark(POOL_DEF), Some(100));
    let rows = ContributionRepository::new(&db.conn)
        .for_pool(&POOL_DEF)
        .unwrap();
    assert_eq!(rows.len(), 1);
}

// No-advance-on-failure for the persistence side: a store outage mid-range
// leaves the watermark where it was, and the retry persists exactly once.
#[tokio::test]
async fn store_failure_keeps_watermark_then_retry_persists_once() {
    let chain = MockChain::with_tip(100);
    chain.push_log(contribution_log(POOL_ABC, 50, 95, 3));

    let store = FlakyStore::new();
    store.fail_contributions.store(true, Ordering::Relaxed);

    let registry = registry_with(100, &[(POOL_ABC, 90)]);
    let scanner = Scanner::new(&chain, &store, &registry, FACTORY);

    let entry = registry
        .snapshot()
        .into_iter()
        .find(|e| e.address == POOL_ABC)
        .unwrap();
    assert!(scanner.scan_pool(&entry, 100).await.is_err());
    assert_eq!(registry.watermark(POOL_ABC), Some(90));
    assert_eq!(store.cursor(&POOL_ABC).unwrap(), None);

    store.fail_contributions.store(false, Ordering::Relaxed);
    assert_eq!(scanner.scan_pool(&entry, 100).await.unwrap(), 1);
    assert_eq!(registry.watermark(POOL_ABC), Some(100));

    let rows = ContributionRepository::new(&store.inner.conn)
        .for_pool(&POOL_ABC)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].log_index, 3);
}

// Re-scanning an already scanned range (as a restart with a stale cursor
// would) upserts the same keys and produces no duplicate rows.
#[tokio::test]
async fn overlapping_rescan_is_idempotent() {
    let chain = MockChain::with_tip(110);
    chain.push_log(pool_created_log(POOL_ABC, 95, 0));
    chain.push_log(contribution_log(POOL_ABC, 50, 105, 7));

    let db = Database::in_memory().unwrap();
    let registry = registry_with(90, &[]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();
    assert_eq!(ContributionRepository::new(&db.conn).count().unwrap(), 1);

    // Same chain, stale watermarks: everything gets replayed.
    let stale_registry = registry_with(90, &[(POOL_ABC, 94)]);
    let replay_driver = Driver::new(&chain, &db, &stale_registry, FACTORY, POLL_INTERVAL);
    replay_driver.run_cycle().await.unwrap();

    assert_eq!(ContributionRepository::new(&db.conn).count().unwrap(), 1);
    assert_eq!(PoolRepository::new(&db.conn).all().unwrap().len(), 1);
}

// Ranges longer than one getLogs batch advance in increments and still
// cover every block exactly once.
#[tokio::test]
async fn long_catchup_range_is_batched_and_complete() {
    let chain = MockChain::with_tip(2_500);
    chain.push_log(contribution_log(POOL_ABC, 1, 10, 0));
    chain.push_log(contribution_log(POOL_ABC, 2, 1_500, 0));
    chain.push_log(contribution_log(POOL_ABC, 3, 2_499, 0));

    let db = Database::in_memory().unwrap();
    let registry = registry_with(2_500, &[(POOL_ABC, 0)]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    driver.run_cycle().await.unwrap();

    let rows = ContributionRepository::new(&db.conn)
        .for_pool(&POOL_ABC)
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(registry.watermark(POOL_ABC), Some(2_500));
}

// Restart path: cursors win, pools without a cursor are seeded from their
// creation block so their history is backfilled.
#[tokio::test]
async fn bootstrap_seeds_watermarks_from_cursors_then_creation_blocks() {
    let chain = MockChain {
        deployment_block: 10,
        ..MockChain::default()
    };
    chain.set_tip(200);

    let db = Database::in_memory().unwrap();
    db.set_cursor(&FACTORY, 150).unwrap();

    let with_cursor = PoolRecord {
        address: POOL_ABC,
        investigator: INVESTIGATOR,
        threshold: U256::from(1_000u64),
        min_unlock_amount: U256::from(100u64),
        deadline: U256::ZERO,
        payload: Bytes::new(),
        created_block: 40,
        transaction_hash: tx_hash(0xaa),
        factory_address: FACTORY,
    };
    let mut without_cursor = with_cursor.clone();
    without_cursor.address = POOL_DEF;
    without_cursor.created_block = 120;

    db.upsert_pool(&with_cursor).unwrap();
    db.upsert_pool(&without_cursor).unwrap();
    db.set_cursor(&POOL_ABC, 80).unwrap();

    let registry = bootstrap_registry(&chain, &db, FACTORY).await.unwrap();

    assert_eq!(registry.watermark(FACTORY), Some(150));
    assert_eq!(registry.watermark(POOL_ABC), Some(80));
    assert_eq!(registry.watermark(POOL_DEF), Some(119));
}

// First run ever: no factory cursor, so the deployment block is located by
// bytecode binary search and scanning starts just below it.
#[tokio::test]
async fn bootstrap_without_cursor_finds_factory_deployment_block() {
    let chain = MockChain {
        deployment_block: 42,
        ..MockChain::default()
    };
    chain.set_tip(500);

    let db = Database::in_memory().unwrap();
    let registry = bootstrap_registry(&chain, &db, FACTORY).await.unwrap();

    assert_eq!(registry.watermark(FACTORY), Some(41));
}

// The driver loop must honor a shutdown signal between cycles.
#[tokio::test]
async fn run_stops_on_shutdown_signal() {
    let chain = MockChain::with_tip(100);
    let db = Database::in_memory().unwrap();
    let registry = registry_with(100, &[]);
    let driver = Driver::new(&chain, &db, &registry, FACTORY, POLL_INTERVAL);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tx.send(()).unwrap();

    driver
        .run(async {
            let _ = rx.await;
        })
        .await
        .unwrap();
}
