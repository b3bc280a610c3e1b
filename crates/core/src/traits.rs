//! Core traits for the external collaborators
//!
//! This module defines the seams to everything the coordination layer does not
//! own: committed storage, the distributed lock backend and the key
//! expression evaluator. Each has an in-memory reference implementation in the
//! storage, concurrency and engine crates respectively.

use std::time::Duration;

use crate::error::StrataResult;
use crate::interrupt::Interrupt;
use crate::stock::{Stock, VersionedStock};
use crate::types::{HolderId, StockId};
use crate::value::Value;

/// Committed-state storage for stock records
///
/// Reads observe only committed state. Writes arrive exclusively through
/// `apply`, called by the transaction manager at commit.
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Latest committed state of a stock, if it exists
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, id: StockId) -> StrataResult<Option<VersionedStock>>;

    /// Make a committed unit of work's writes durable and visible
    ///
    /// All writes carry the same `commit_version`. Inserts and updates are
    /// not distinguished; the last applied write for an id wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes could not be persisted. No write of the
    /// batch is visible in that case.
    fn apply(&self, writes: &[Stock], commit_version: u64) -> StrataResult<()>;

    /// Highest commit version applied so far
    fn current_version(&self) -> u64;
}

/// Distributed lock backend
///
/// Provides atomic acquire-with-timeout and release per key. Ownership is
/// tracked by [`HolderId`]; a grant expires after its lease even if never
/// released.
pub trait LockBackend: Send + Sync {
    /// Try to obtain `key` for `holder`, blocking up to `wait`
    ///
    /// Returns `Ok(true)` when granted and `Ok(false)` when `wait` elapsed.
    ///
    /// # Errors
    ///
    /// Returns `LockInterrupted` if `interrupt` fires while waiting.
    fn try_acquire(
        &self,
        key: &str,
        holder: HolderId,
        wait: Duration,
        lease: Duration,
        interrupt: &Interrupt,
    ) -> StrataResult<bool>;

    /// Release `key` held by `holder`
    ///
    /// # Errors
    ///
    /// Returns `LeaseExpired` if the holder's grant timed out and
    /// `LockNotHeld` if the holder never held the key. An expired entry of the
    /// same holder may be cleared; another holder's grant is never touched.
    fn unlock(&self, key: &str, holder: HolderId) -> StrataResult<()>;

    /// True if `holder` currently owns an unexpired grant on `key`
    fn is_held_by(&self, key: &str, holder: HolderId) -> bool;
}

/// Maps a call's arguments onto a lock key
///
/// Implementations must be pure: same inputs, same output, no I/O.
pub trait KeyResolver: Send + Sync {
    /// Resolve `expression` against the call's parameters
    ///
    /// # Errors
    ///
    /// Returns `KeyResolution` if the expression references a parameter that
    /// does not exist or the names and values do not line up.
    fn resolve(
        &self,
        param_names: &[&str],
        param_values: &[Value],
        expression: &str,
    ) -> StrataResult<String>;
}
