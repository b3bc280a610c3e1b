//! Transaction manager for units of work
//!
//! Owns version and id allocation and the two unit-of-work lifetimes the
//! boundary strategies need:
//!
//! - **required**: join the ambient unit of work if there is one, otherwise
//!   begin a new one and commit it when the closure returns
//! - **requires_new**: always begin a new unit of work and commit it
//!   synchronously before returning, regardless of any ambient one
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. ensure_active() - reject committed/aborted units of work
//! 2. Check bound lock leases - abort with LeaseExpired if any ran out
//! 3. Allocate commit_version (increment global version)
//! 4. storage.apply(write_set, commit_version) - DURABILITY + VISIBILITY POINT
//! 5. Re-check bound lock leases - warn and count, writes stay applied
//! 6. mark_committed(commit_version)
//! 7. Release bound locks
//! 8. Return commit_version
//! ```
//!
//! If step 2 or 4 fails the unit of work is marked aborted, nothing is
//! visible and the bound locks are still released.
//!
//! Step 2 cannot cover a lease that runs out while `apply` is in progress.
//! Step 5 reports that overrun; another holder may have read the state from
//! before this commit.

use crate::transaction::{TransactionContext, UnitOfWork};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::traits::Storage;
use strata_core::{Stock, StrataError, StrataResult};
use tracing::{debug, error, warn};

/// Outcome of a unit of work that has been committed or rolled back
///
/// Only [`TransactionManager::settle`] constructs one, so holding a `Settled`
/// proves the unit of work has reached a terminal state and that any lock
/// bound to it has been released.
#[derive(Debug)]
#[must_use = "a settled unit of work carries the call's result"]
pub struct Settled<T> {
    txn_id: u64,
    commit_version: Option<u64>,
    outcome: StrataResult<T>,
}

impl<T> Settled<T> {
    /// Id of the settled unit of work
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Commit version, if the unit of work committed
    pub fn commit_version(&self) -> Option<u64> {
        self.commit_version
    }

    /// True if the unit of work committed
    pub fn is_committed(&self) -> bool {
        self.commit_version.is_some()
    }

    /// The body's result, or the commit failure
    pub fn into_result(self) -> StrataResult<T> {
        self.outcome
    }
}

/// Snapshot of transaction counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionMetrics {
    /// Units of work begun
    pub started: u64,
    /// Units of work committed
    pub committed: u64,
    /// Units of work rolled back or failed at commit
    pub aborted: u64,
    /// Commits whose bound lease ran out while writes were being applied
    pub lease_overruns: u64,
}

/// Manages unit-of-work lifecycle and commits
///
/// The metric counters use Relaxed ordering; they are observational only.
pub struct TransactionManager {
    storage: Arc<dyn Storage>,
    /// Global version counter, incremented once per non-empty commit
    version: AtomicU64,
    next_txn_id: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_lease_overruns: AtomicU64,
}

impl TransactionManager {
    /// Create a manager over `storage`, continuing from its current version
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let version = storage.current_version();
        TransactionManager {
            storage,
            version: AtomicU64::new(version),
            next_txn_id: AtomicU64::new(1),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_lease_overruns: AtomicU64::new(0),
        }
    }

    /// Committed storage
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate next commit version (increment global version)
    pub fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Begin a new unit of work
    pub fn begin(&self) -> UnitOfWork {
        let ctx = TransactionContext::new(self.next_txn_id());
        self.total_started.fetch_add(1, Ordering::Relaxed);
        debug!(txn_id = ctx.txn_id, "Began unit of work");
        UnitOfWork::new(ctx, Arc::clone(&self.storage))
    }

    /// Commit a unit of work
    ///
    /// Returns the commit version. A unit of work without writes commits at
    /// the current version without touching storage.
    ///
    /// # Errors
    ///
    /// - `TransactionNotActive` if already committed or aborted
    /// - `LeaseExpired` if a bound lock's lease ran out; nothing is applied
    /// - the storage error if applying the writes failed; the unit of work is
    ///   aborted and none of its writes are visible
    ///
    /// Locks bound to the unit of work are released after the outcome is
    /// decided, in every case.
    pub fn commit(&self, uow: &UnitOfWork) -> StrataResult<u64> {
        let (result, bound_locks) = uow.with_context(|ctx| {
            let result = self.commit_context(ctx);
            (result, ctx.take_bound_locks())
        });

        match &result {
            Ok(_) => {
                self.total_committed.fetch_add(1, Ordering::Relaxed);
            }
            Err(StrataError::TransactionNotActive { .. }) => {}
            Err(_) => {
                self.total_aborted.fetch_add(1, Ordering::Relaxed);
            }
        }

        // Bound locks go back only now, after the writes are visible
        drop(bound_locks);
        result
    }

    fn commit_context(&self, ctx: &mut TransactionContext) -> StrataResult<u64> {
        ctx.ensure_active()?;

        if let Some(expired) = ctx.bound_locks().iter().find(|g| !g.is_lease_valid()) {
            let key = expired.key().to_string();
            warn!(txn_id = ctx.txn_id, %key, "Lease expired before commit, unit of work aborted");
            ctx.mark_aborted(format!("lease expired for {}", key))?;
            return Err(StrataError::LeaseExpired { key });
        }

        if ctx.write_set.is_empty() {
            let version = self.current_version();
            ctx.mark_committed(version)?;
            return Ok(version);
        }

        let writes: Vec<Stock> = ctx.write_set.values().cloned().collect();
        let commit_version = self.allocate_version();

        if let Err(e) = self.storage.apply(&writes, commit_version) {
            warn!(
                txn_id = ctx.txn_id,
                commit_version,
                error = %e,
                "Commit failed, unit of work aborted"
            );
            ctx.mark_aborted(format!("commit failed: {}", e))?;
            return Err(e);
        }

        if let Some(overrun) = ctx.bound_locks().iter().find(|g| !g.is_lease_valid()) {
            self.total_lease_overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                txn_id = ctx.txn_id,
                key = %overrun.key(),
                commit_version,
                "Lease expired while applying writes; another holder may have read pre-commit state"
            );
        }

        ctx.mark_committed(commit_version)?;
        debug!(
            txn_id = ctx.txn_id,
            commit_version,
            writes = writes.len(),
            elapsed_us = ctx.elapsed().as_micros() as u64,
            "Committed unit of work"
        );
        Ok(commit_version)
    }

    /// Discard a unit of work's buffered writes
    ///
    /// Bound locks are released afterwards.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if already committed or aborted.
    pub fn rollback(&self, uow: &UnitOfWork, reason: impl Into<String>) -> StrataResult<()> {
        let reason = reason.into();
        let bound_locks = uow.with_context(|ctx| {
            ctx.mark_aborted(reason.clone())?;
            debug!(txn_id = ctx.txn_id, %reason, "Rolled back unit of work");
            Ok::<_, StrataError>(ctx.take_bound_locks())
        })?;
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
        drop(bound_locks);
        Ok(())
    }

    /// Commit on success, roll back on failure
    ///
    /// A commit failure replaces a successful body result. A body failure is
    /// returned unchanged; a rollback failure is only logged.
    pub fn settle<T>(&self, uow: &UnitOfWork, result: StrataResult<T>) -> Settled<T> {
        let txn_id = uow.txn_id();
        match result {
            Ok(value) => match self.commit(uow) {
                Ok(version) => Settled {
                    txn_id,
                    commit_version: Some(version),
                    outcome: Ok(value),
                },
                Err(e) => Settled {
                    txn_id,
                    commit_version: None,
                    outcome: Err(e),
                },
            },
            Err(e) => {
                if let Err(rollback_err) = self.rollback(uow, e.to_string()) {
                    error!(txn_id, error = %rollback_err, "Rollback failed");
                }
                Settled {
                    txn_id,
                    commit_version: None,
                    outcome: Err(e),
                }
            }
        }
    }

    /// Run `f` in the ambient unit of work, or in a new one committed on return
    ///
    /// When `ambient` is given, `f` joins it and nothing is committed here;
    /// the ambient unit of work's owner decides.
    pub fn required<T, F>(&self, ambient: Option<&UnitOfWork>, f: F) -> StrataResult<T>
    where
        F: FnOnce(&UnitOfWork) -> StrataResult<T>,
    {
        match ambient {
            Some(uow) => f(uow),
            None => {
                let uow = self.begin();
                let result = f(&uow);
                self.settle(&uow, result).into_result()
            }
        }
    }

    /// Run `f` in a new unit of work committed before returning
    ///
    /// Any ambient unit of work is left untouched; its later rollback does not
    /// undo what was committed here.
    pub fn requires_new<T, F>(&self, f: F) -> StrataResult<T>
    where
        F: FnOnce(&UnitOfWork) -> StrataResult<T>,
    {
        let uow = self.begin();
        let result = f(&uow);
        self.settle(&uow, result).into_result()
    }

    /// Run `f` in a new unit of work (closure API)
    pub fn transaction<T, F>(&self, f: F) -> StrataResult<T>
    where
        F: FnOnce(&UnitOfWork) -> StrataResult<T>,
    {
        self.required(None, f)
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            started: self.total_started.load(Ordering::Relaxed),
            committed: self.total_committed.load(Ordering::Relaxed),
            aborted: self.total_aborted.load(Ordering::Relaxed),
            lease_overruns: self.total_lease_overruns.load(Ordering::Relaxed),
        }
    }
}
