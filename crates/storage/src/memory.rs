//! In-memory committed store
//!
//! Reference implementation of [`Storage`] for stock records.
//!
//! # Design
//!
//! - DashMap: sharded map from `StockId` to the latest committed record
//! - AtomicU64: highest applied commit version
//! - Optional commit latency: `apply` sleeps before publishing a batch,
//!   standing in for the flush and fsync a durable engine performs. The
//!   latency widens the window between "commit started" and "commit visible",
//!   which is what makes a lock released before commit observable in tests.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::traits::Storage;
use strata_core::{Stock, StockId, StrataResult, VersionedStock};
use tracing::trace;

/// DashMap-backed committed store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<StockId, VersionedStock>,
    version: AtomicU64,
    commit_latency: Duration,
    /// Serializes batch publication so that two batches never interleave
    publish: Mutex<()>,
}

impl MemoryStore {
    /// Create an empty store with no simulated commit latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose commits take at least `latency`
    pub fn with_commit_latency(latency: Duration) -> Self {
        Self {
            commit_latency: latency,
            ..Self::default()
        }
    }

    /// Simulated commit latency
    pub fn commit_latency(&self) -> Duration {
        self.commit_latency
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record (test teardown)
    pub fn clear(&self) {
        let _publish = self.publish.lock();
        self.records.clear();
    }
}

impl Storage for MemoryStore {
    fn get(&self, id: StockId) -> StrataResult<Option<VersionedStock>> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    fn apply(&self, writes: &[Stock], commit_version: u64) -> StrataResult<()> {
        if !self.commit_latency.is_zero() {
            std::thread::sleep(self.commit_latency);
        }

        let _publish = self.publish.lock();
        for stock in writes {
            self.records.insert(
                stock.id(),
                VersionedStock {
                    stock: stock.clone(),
                    version: commit_version,
                },
            );
        }
        self.version.fetch_max(commit_version, Ordering::AcqRel);
        trace!(commit_version, writes = writes.len(), "Applied commit");
        Ok(())
    }

    fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
