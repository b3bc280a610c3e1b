//! Testing utilities for commit failure paths
//!
//! - **FaultyStore**: wraps any [`Storage`] and fails `apply` at chosen
//!   injection points, so callers can check that a failing commit still
//!   releases its lock and leaves committed state untouched.
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::{MemoryStore, testing::{FaultyStore, FaultPlan}};
//!
//! let store = FaultyStore::new(MemoryStore::new(), FaultPlan::FailNext(1));
//! // the next commit returns StrataError::Storage
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::traits::Storage;
use strata_core::{Stock, StockId, StrataError, StrataResult, VersionedStock};

/// When the wrapped store should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPlan {
    /// Never fail (baseline)
    Never,
    /// Fail the next `n` commits, then behave normally
    FailNext(u64),
    /// Fail every commit
    Always,
}

/// Storage wrapper with injectable commit failures
#[derive(Debug)]
pub struct FaultyStore<S: Storage> {
    inner: S,
    plan: Mutex<FaultPlan>,
    injected: AtomicU64,
}

impl<S: Storage> FaultyStore<S> {
    /// Wrap `inner` with the given plan
    pub fn new(inner: S, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan: Mutex::new(plan),
            injected: AtomicU64::new(0),
        }
    }

    /// Replace the plan
    pub fn set_plan(&self, plan: FaultPlan) {
        *self.plan.lock() = plan;
    }

    /// Number of failures injected so far
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn should_fail(&self) -> bool {
        let mut plan = self.plan.lock();
        match *plan {
            FaultPlan::Never => false,
            FaultPlan::Always => true,
            FaultPlan::FailNext(0) => false,
            FaultPlan::FailNext(n) => {
                *plan = FaultPlan::FailNext(n - 1);
                true
            }
        }
    }
}

impl<S: Storage> Storage for FaultyStore<S> {
    fn get(&self, id: StockId) -> StrataResult<Option<VersionedStock>> {
        self.inner.get(id)
    }

    fn apply(&self, writes: &[Stock], commit_version: u64) -> StrataResult<()> {
        if self.should_fail() {
            self.injected.fetch_add(1, Ordering::Relaxed);
            return Err(StrataError::storage(format!(
                "injected failure at commit version {}",
                commit_version
            )));
        }
        self.inner.apply(writes, commit_version)
    }

    fn current_version(&self) -> u64 {
        self.inner.current_version()
    }
}
