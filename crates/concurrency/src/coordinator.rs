//! Lock coordinator for guarded calls
//!
//! Wraps a [`LockBackend`] and adds:
//! - holder identity per acquisition
//! - scoped release through [`LockGuard`], which owns a handle to the
//!   coordinator so it can outlive the call that acquired it (a unit of work
//!   may keep it until commit)
//! - recovery of release-without-ownership (logged, never propagated)
//! - lock metrics (granted, timed out, interrupted, released, release failures)
//!
//! # Outcomes of `acquire`
//!
//! | Backend result | Coordinator result |
//! |---|---|
//! | granted | `Ok(Acquire::Granted(guard))` |
//! | wait elapsed | `Ok(Acquire::TimedOut)` |
//! | interrupted | `Err(StrataError::LockInterrupted)` |

use crate::lock::deadline_after;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::traits::LockBackend;
use strata_core::{HolderId, Interrupt, LockKey, StrataError, StrataResult};
use tracing::{debug, info, warn};

/// Result of a non-failing acquisition attempt
#[must_use = "dropping a granted Acquire releases the lock immediately"]
pub enum Acquire {
    /// Lock is held until the guard is released or dropped
    Granted(LockGuard),
    /// Wait time elapsed without obtaining the lock
    TimedOut,
}

impl Acquire {
    /// True if granted
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquire::Granted(_))
    }

    /// The guard, if granted
    pub fn into_guard(self) -> Option<LockGuard> {
        match self {
            Acquire::Granted(guard) => Some(guard),
            Acquire::TimedOut => None,
        }
    }
}

impl fmt::Debug for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acquire::Granted(guard) => f.debug_tuple("Granted").field(guard).finish(),
            Acquire::TimedOut => f.write_str("TimedOut"),
        }
    }
}

/// Snapshot of lock counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockMetrics {
    /// Acquisitions granted
    pub granted: u64,
    /// Acquisitions that ran out of wait time
    pub timed_out: u64,
    /// Acquisitions abandoned by interrupt
    pub interrupted: u64,
    /// Releases accepted by the backend
    pub released: u64,
    /// Releases rejected by the backend (expired lease or not held)
    pub release_failures: u64,
}

/// Acquires and releases keyed locks on behalf of guarded calls
///
/// The metric counters use Relaxed ordering; they are observational only.
pub struct LockCoordinator {
    backend: Arc<dyn LockBackend>,
    granted: AtomicU64,
    timed_out: AtomicU64,
    interrupted: AtomicU64,
    released: AtomicU64,
    release_failures: AtomicU64,
}

impl LockCoordinator {
    /// Create a coordinator over `backend`
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            granted: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
            released: AtomicU64::new(0),
            release_failures: AtomicU64::new(0),
        }
    }

    /// The wrapped backend
    pub fn backend(&self) -> &Arc<dyn LockBackend> {
        &self.backend
    }

    /// Try to take `key`, blocking up to `wait`
    ///
    /// A granted lock auto-expires after `lease` even if never released.
    ///
    /// # Errors
    ///
    /// Returns `LockInterrupted` if `interrupt` fires before the lock is
    /// obtained. A timeout is not an error.
    pub fn acquire(
        self: &Arc<Self>,
        key: &LockKey,
        wait: Duration,
        lease: Duration,
        interrupt: &Interrupt,
    ) -> StrataResult<Acquire> {
        let holder = HolderId::new();
        let started = Instant::now();

        match self
            .backend
            .try_acquire(key.as_str(), holder, wait, lease, interrupt)
        {
            Ok(true) => {
                self.granted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = %key,
                    %holder,
                    waited_us = started.elapsed().as_micros() as u64,
                    "Lock granted"
                );
                Ok(Acquire::Granted(LockGuard {
                    coordinator: Arc::clone(self),
                    key: key.clone(),
                    holder,
                    lease_deadline: deadline_after(Instant::now(), lease),
                    released: false,
                }))
            }
            Ok(false) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, wait_ms = wait.as_millis() as u64, "Lock wait timed out");
                Ok(Acquire::TimedOut)
            }
            Err(e) => {
                if matches!(e, StrataError::LockInterrupted { .. }) {
                    self.interrupted.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Lock wait interrupted");
                }
                Err(e)
            }
        }
    }

    /// Release a grant; never fails
    ///
    /// Release-without-ownership is recovered here: it is counted and
    /// logged, and the caller's result is left alone.
    fn release(&self, key: &LockKey, holder: HolderId, lease_deadline: Instant) {
        match self.backend.unlock(key.as_str(), holder) {
            Ok(()) => {
                self.released.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, %holder, "Lock released");
            }
            Err(e) if e.is_release_without_ownership() => {
                self.release_failures.fetch_add(1, Ordering::Relaxed);
                if Instant::now() >= lease_deadline {
                    warn!(
                        key = %key,
                        %holder,
                        "Lease expired before release; another holder may have overlapped"
                    );
                } else {
                    info!(key = %key, %holder, "Lock already unlocked");
                }
            }
            Err(e) => {
                self.release_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, %holder, error = %e, "Lock release failed");
            }
        }
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> LockMetrics {
        LockMetrics {
            granted: self.granted.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive handle to one granted lock
///
/// States: held → released, exactly once. Release happens on `release` or
/// drop, whichever comes first, so every exit path of a guarded call
/// (success, error, panic unwinding) gives the lock back.
pub struct LockGuard {
    coordinator: Arc<LockCoordinator>,
    key: LockKey,
    holder: HolderId,
    lease_deadline: Instant,
    released: bool,
}

impl LockGuard {
    /// Key this guard holds
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Holder identity of this grant
    pub fn holder(&self) -> HolderId {
        self.holder
    }

    /// True if the backend still attributes the key to this grant
    pub fn is_lease_valid(&self) -> bool {
        self.coordinator
            .backend
            .is_held_by(self.key.as_str(), self.holder)
    }

    /// Fail with `LeaseExpired` unless the lease is still valid
    ///
    /// # Errors
    ///
    /// Returns `LeaseExpired` if the grant is no longer held.
    pub fn ensure_lease_valid(&self) -> StrataResult<()> {
        if self.is_lease_valid() {
            Ok(())
        } else {
            Err(StrataError::LeaseExpired {
                key: self.key.to_string(),
            })
        }
    }

    /// Release now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator
                .release(&self.key, self.holder, self.lease_deadline);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .field("released", &self.released)
            .finish()
    }
}
