use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// One watched address and the last block fully scanned for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEntry {
    pub address: Address,
    pub last_scanned_block: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("address {0} was never registered")]
    UnknownEntity(Address),
}

/// The set of addresses currently polled for events: the factory plus every
/// pool discovered so far. Grows at runtime as `PoolCreated` events arrive.
///
/// Shared between the driver (which registers new pools mid-cycle) and the
/// scanner (which advances watermarks), so all access goes through the mutex.
/// Scans iterate over a `snapshot`; registrations taken during a cycle become
/// visible at the next snapshot.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: Mutex<HashMap<Address, u64>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry if absent. Re-registering a known address is a no-op,
    /// which makes re-scanning a range containing its creation event safe.
    pub fn register(&self, address: Address, watermark: u64) {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .entry(address)
            .or_insert(watermark);
    }

    pub fn watermark(&self, address: Address) -> Option<u64> {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .get(&address)
            .copied()
    }

    /// Stable copy of all entries, sorted by address for deterministic scan
    /// order.
    pub fn snapshot(&self) -> Vec<WatchEntry> {
        let mut entries: Vec<WatchEntry> = self
            .entries
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .map(|(address, last_scanned_block)| WatchEntry {
                address: *address,
                last_scanned_block: *last_scanned_block,
            })
            .collect();
        entries.sort_by_key(|entry| entry.address);
        entries
    }

    /// Moves an entry's watermark forward. Values at or below the current
    /// watermark are ignored so the watermark never regresses.
    pub fn advance(&self, address: Address, new_watermark: u64) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        let current = entries
            .get_mut(&address)
            .ok_or(RegistryError::UnknownEntity(address))?;
        if new_watermark > *current {
            *current = new_watermark;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
