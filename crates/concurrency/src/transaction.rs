//! Unit of work over committed storage
//!
//! A unit of work buffers the writes of one load-mutate-persist sequence and
//! makes them visible to everyone else only when the transaction manager
//! commits it.
//!
//! # Isolation
//!
//! Reads are read-committed with read-your-writes:
//! 1. **write_set**: returns this unit of work's own buffered write
//! 2. **storage**: returns the latest committed state
//!
//! There is no commit-time validation. Two units of work that read the same
//! committed state and both commit produce a lost update; serializing them is
//! the lock's job, and making the first one's commit visible before the second
//! one reads is the boundary strategy's job.
//!
//! # Bound locks
//!
//! A [`LockGuard`] can be bound to a unit of work with [`UnitOfWork::bind_lock`].
//! The transaction manager then checks the guard's lease before applying
//! writes and releases it only once the unit of work is committed or rolled
//! back. A unit of work dropped without settling releases its guards on drop.

use crate::coordinator::LockGuard;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::traits::Storage;
use strata_core::{Stock, StockId, StrataError, StrataResult};

/// Status of a unit of work in its lifecycle
///
/// State transitions:
/// - `Active` → `Committed` (commit succeeded)
/// - `Active` → `Aborted` (rollback, body error or commit failure)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Unit of work is executing, can read/write
    Active,
    /// Writes are durable and visible
    Committed {
        /// Version assigned by the commit
        version: u64,
    },
    /// Writes were discarded
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => f.write_str("Active"),
            TransactionStatus::Committed { version } => write!(f, "Committed@{}", version),
            TransactionStatus::Aborted { reason } => write!(f, "Aborted({})", reason),
        }
    }
}

/// Per-transaction bookkeeping
#[derive(Debug)]
pub struct TransactionContext {
    /// Unique transaction id
    pub txn_id: u64,
    /// Buffered writes, applied at commit
    pub write_set: BTreeMap<StockId, Stock>,
    /// Lifecycle state
    pub status: TransactionStatus,
    /// Locks released after this unit of work settles
    bound_locks: Vec<LockGuard>,
    start_time: Instant,
}

impl TransactionContext {
    /// Create an active context
    pub fn new(txn_id: u64) -> Self {
        Self {
            txn_id,
            write_set: BTreeMap::new(),
            status: TransactionStatus::Active,
            bound_locks: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// True while reads and writes are allowed
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Fail unless active
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` carrying the current state.
    pub fn ensure_active(&self) -> StrataResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StrataError::TransactionNotActive {
                state: self.status.to_string(),
            })
        }
    }

    /// Mark committed at `version`
    pub fn mark_committed(&mut self, version: u64) -> StrataResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Committed { version };
        Ok(())
    }

    /// Discard buffered writes and mark aborted
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> StrataResult<()> {
        self.ensure_active()?;
        self.write_set.clear();
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        Ok(())
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.write_set.len()
    }

    /// Locks bound to this unit of work
    pub fn bound_locks(&self) -> &[LockGuard] {
        &self.bound_locks
    }

    /// Detach bound locks so the caller can release them
    pub(crate) fn take_bound_locks(&mut self) -> Vec<LockGuard> {
        std::mem::take(&mut self.bound_locks)
    }

    /// Time since the context was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Shared handle to one unit of work
///
/// Cloning the handle does not start a new unit of work; every clone sees the
/// same buffered writes and the same status. This is how an ambient unit of
/// work is joined by the operations it encloses.
#[derive(Clone)]
pub struct UnitOfWork {
    ctx: Arc<Mutex<TransactionContext>>,
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.ctx.lock();
        f.debug_struct("UnitOfWork")
            .field("txn_id", &ctx.txn_id)
            .field("status", &ctx.status)
            .field("pending_writes", &ctx.write_set.len())
            .finish()
    }
}

impl UnitOfWork {
    pub(crate) fn new(ctx: TransactionContext, storage: Arc<dyn Storage>) -> Self {
        Self {
            ctx: Arc::new(Mutex::new(ctx)),
            storage,
        }
    }

    /// Transaction id
    pub fn txn_id(&self) -> u64 {
        self.ctx.lock().txn_id
    }

    /// Current lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.ctx.lock().status.clone()
    }

    /// True while reads and writes are allowed
    pub fn is_active(&self) -> bool {
        self.ctx.lock().is_active()
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.ctx.lock().pending_writes()
    }

    /// True if both handles refer to the same unit of work
    pub fn same_as(&self, other: &UnitOfWork) -> bool {
        Arc::ptr_eq(&self.ctx, &other.ctx)
    }

    /// Load a stock, preferring this unit of work's own buffered write
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` after commit/rollback, or a storage error.
    pub fn find_by_id(&self, id: StockId) -> StrataResult<Option<Stock>> {
        let ctx = self.ctx.lock();
        ctx.ensure_active()?;

        if let Some(stock) = ctx.write_set.get(&id) {
            return Ok(Some(stock.clone()));
        }

        Ok(self.storage.get(id)?.map(|committed| committed.stock))
    }

    /// Load a stock that must exist
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no stock with `id` is visible.
    pub fn get_by_id(&self, id: StockId) -> StrataResult<Stock> {
        self.find_by_id(id)?.ok_or(StrataError::NotFound { id })
    }

    /// Buffer a write; visible to this unit of work immediately and to
    /// others only after commit
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` after commit/rollback.
    pub fn save_and_flush(&self, stock: &Stock) -> StrataResult<()> {
        let mut ctx = self.ctx.lock();
        ctx.ensure_active()?;
        ctx.write_set.insert(stock.id(), stock.clone());
        Ok(())
    }

    /// Keep `guard` held until this unit of work commits or rolls back
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` after commit/rollback; the guard is
    /// released immediately in that case.
    pub fn bind_lock(&self, guard: LockGuard) -> StrataResult<()> {
        let mut ctx = self.ctx.lock();
        ctx.ensure_active()?;
        ctx.bound_locks.push(guard);
        Ok(())
    }

    /// Number of locks bound to this unit of work
    pub fn bound_lock_count(&self) -> usize {
        self.ctx.lock().bound_locks.len()
    }

    /// Run `f` with exclusive access to the context
    pub(crate) fn with_context<T>(&self, f: impl FnOnce(&mut TransactionContext) -> T) -> T {
        let mut ctx = self.ctx.lock();
        f(&mut ctx)
    }
}
