//! Concurrency layer for stratalock
//!
//! This crate implements units of work, keyed locks and the seam between them:
//! - UnitOfWork / TransactionManager: buffered writes, commit, rollback,
//!   joined (required) and independent (requires_new) lifetimes
//! - LockCoordinator / LockGuard: keyed locks with wait and lease times,
//!   scoped release, release-without-ownership recovery
//! - InMemoryLockBackend: lease-table reference backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod lock;
pub mod manager;
pub mod transaction;

pub use coordinator::{Acquire, LockCoordinator, LockGuard, LockMetrics};
pub use lock::InMemoryLockBackend;
pub use manager::{Settled, TransactionManager, TransactionMetrics};
pub use transaction::{TransactionContext, TransactionStatus, UnitOfWork};
