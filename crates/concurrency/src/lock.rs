//! In-memory lease-based lock backend
//!
//! Reference implementation of [`LockBackend`] with the semantics of a
//! distributed lock server:
//!
//! - one holder per key, identified by [`HolderId`]
//! - every grant carries a lease; an expired lease is free for the taking
//!   even if its holder never released it
//! - waiters block on a condvar, bounded by their wait time, the current
//!   lease's expiry and [`INTERRUPT_POLL`] so interrupts are noticed promptly
//!
//! # Release
//!
//! `unlock` only succeeds for the current, unexpired holder. Anything else
//! leaves the table untouched apart from reclaiming the caller's own expired
//! entry, so a late release can never free a grant that belongs to someone else.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use strata_core::traits::LockBackend;
use strata_core::{HolderId, Interrupt, StrataError, StrataResult};
use tracing::trace;

/// Upper bound on a single condvar wait
pub const INTERRUPT_POLL: Duration = Duration::from_millis(5);

/// Stand-in for waits and leases too long to represent as an `Instant`
pub const UNBOUNDED: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `from + after`, clamped to [`UNBOUNDED`] when the sum overflows
pub(crate) fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .or_else(|| from.checked_add(UNBOUNDED))
        .unwrap_or(from)
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    holder: HolderId,
    expires_at: Instant,
}

impl Lease {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Lease table guarded by a mutex, with a condvar for waiters
#[derive(Debug, Default)]
pub struct InMemoryLockBackend {
    leases: Mutex<HashMap<String, Lease>>,
    released: Condvar,
}

impl InMemoryLockBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `key` has an unexpired holder
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .is_some_and(|lease| !lease.is_expired(now))
    }

    /// Number of keys with an unexpired holder
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.leases
            .lock()
            .values()
            .filter(|lease| !lease.is_expired(now))
            .count()
    }
}

impl LockBackend for InMemoryLockBackend {
    fn try_acquire(
        &self,
        key: &str,
        holder: HolderId,
        wait: Duration,
        lease: Duration,
        interrupt: &Interrupt,
    ) -> StrataResult<bool> {
        let deadline = deadline_after(Instant::now(), wait);
        let mut leases = self.leases.lock();

        loop {
            if interrupt.is_interrupted() {
                return Err(StrataError::LockInterrupted {
                    key: key.to_string(),
                });
            }

            let now = Instant::now();
            let current = leases.get(key).copied();
            let blocking = match current {
                Some(existing) if !existing.is_expired(now) => existing,
                _ => {
                    if let Some(expired) = current {
                        trace!(key, previous = %expired.holder, "Taking over expired lease");
                    }
                    leases.insert(
                        key.to_string(),
                        Lease {
                            holder,
                            expires_at: deadline_after(now, lease),
                        },
                    );
                    return Ok(true);
                }
            };

            if now >= deadline {
                return Ok(false);
            }

            let timeout = (deadline - now)
                .min(blocking.expires_at - now)
                .min(INTERRUPT_POLL);
            self.released.wait_for(&mut leases, timeout);
        }
    }

    fn unlock(&self, key: &str, holder: HolderId) -> StrataResult<()> {
        let mut leases = self.leases.lock();
        let now = Instant::now();

        match leases.get(key).copied() {
            Some(lease) if lease.holder == holder && !lease.is_expired(now) => {
                leases.remove(key);
                drop(leases);
                self.released.notify_all();
                Ok(())
            }
            Some(lease) if lease.holder == holder => {
                leases.remove(key);
                drop(leases);
                self.released.notify_all();
                Err(StrataError::LeaseExpired {
                    key: key.to_string(),
                })
            }
            _ => Err(StrataError::LockNotHeld {
                key: key.to_string(),
            }),
        }
    }

    fn is_held_by(&self, key: &str, holder: HolderId) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .is_some_and(|lease| lease.holder == holder && !lease.is_expired(now))
    }
}
