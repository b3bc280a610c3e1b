//! Core types and traits for stratalock
//!
//! This crate defines the foundational types used throughout the system:
//! - Stock: the invariant-checked resource entity
//! - StockId, ProductId, HolderId, LockKey: identities
//! - Value: argument values of protected calls
//! - Interrupt: cancellation token for blocked acquisitions
//! - Error: Error type hierarchy
//! - Traits: collaborator seams (Storage, LockBackend, KeyResolver)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod interrupt;
pub mod stock;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{StrataError, StrataResult};
pub use interrupt::Interrupt;
pub use stock::{Stock, VersionedStock};
pub use traits::{KeyResolver, LockBackend, Storage};
pub use types::{HolderId, LockKey, ProductId, StockId, LOCK_PREFIX};
pub use value::Value;
