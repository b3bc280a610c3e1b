//! Error types for stratalock
//!
//! This module defines every error kind that crosses a crate boundary.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation
//!
//! Only release-without-ownership (`LockNotHeld`, `LeaseExpired`) is recovered
//! locally, by the lock coordinator. Everything else surfaces to the immediate
//! caller unchanged. A lock acquisition that times out is *not* an error; it is
//! reported as a normal "not acquired" outcome.

use crate::types::StockId;
use thiserror::Error;

/// Result type alias for stratalock operations
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Error type for stratalock
#[derive(Debug, Error)]
pub enum StrataError {
    /// Entity does not exist in the store
    #[error("Stock not found: {id}")]
    NotFound {
        /// Missing stock id
        id: StockId,
    },

    /// A domain invariant would be broken by the requested mutation
    #[error("Invariant violation on stock {id}: {message}")]
    InvariantViolation {
        /// Stock the mutation targeted
        id: StockId,
        /// What would have been violated
        message: String,
    },

    /// The waiting thread was interrupted while blocked in acquire
    #[error("Interrupted while waiting for lock '{key}'")]
    LockInterrupted {
        /// Lock key being waited on
        key: String,
    },

    /// Release attempted by a caller that does not hold the lock
    #[error("Lock '{key}' is not held by this caller")]
    LockNotHeld {
        /// Lock key
        key: String,
    },

    /// The grant's lease elapsed before release
    #[error("Lease expired for lock '{key}'")]
    LeaseExpired {
        /// Lock key
        key: String,
    },

    /// The key expression could not be resolved against the call's arguments
    #[error("Cannot resolve lock key from '{expression}': {reason}")]
    KeyResolution {
        /// Declared key expression
        expression: String,
        /// Why resolution failed
        reason: String,
    },

    /// Unit of work used after it was committed or rolled back
    #[error("Transaction not active (state: {state})")]
    TransactionNotActive {
        /// Observed state
        state: String,
    },

    /// Persistence failure
    #[error("Storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },

    /// Invalid argument or configuration value
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl StrataError {
    /// Invariant violation on the given stock
    pub fn invariant(id: StockId, message: impl Into<String>) -> Self {
        StrataError::InvariantViolation {
            id,
            message: message.into(),
        }
    }

    /// Storage failure
    pub fn storage(message: impl Into<String>) -> Self {
        StrataError::Storage {
            message: message.into(),
        }
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StrataError::InvalidInput {
            message: message.into(),
        }
    }

    /// Internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        StrataError::Internal {
            message: message.into(),
        }
    }

    /// Key resolution failure
    pub fn key_resolution(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        StrataError::KeyResolution {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// True for failures raised by the domain itself rather than infrastructure
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            StrataError::InvariantViolation { .. } | StrataError::NotFound { .. }
        )
    }

    /// True for errors originating in the lock layer
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            StrataError::LockInterrupted { .. }
                | StrataError::LockNotHeld { .. }
                | StrataError::LeaseExpired { .. }
        )
    }

    /// True when a release failure can be swallowed by the coordinator
    pub fn is_release_without_ownership(&self) -> bool {
        matches!(
            self,
            StrataError::LockNotHeld { .. } | StrataError::LeaseExpired { .. }
        )
    }
}
