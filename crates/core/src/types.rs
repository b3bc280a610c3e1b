//! Core types for stratalock
//!
//! This module defines the foundational identifiers:
//! - StockId / ProductId: identities of the protected resource
//! - HolderId: identity of one lock holder (one guarded call)
//! - LockKey: the resolved, prefixed name of a mutual-exclusion domain

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix applied to every resolved lock key
pub const LOCK_PREFIX: &str = "LOCK:";

/// Identity of a stored stock record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockId(u64);

impl StockId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the product a stock record counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(u64);

impl ProductId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one lock holder
///
/// Every acquisition attempt gets a fresh UUID v4 so that a release can be
/// matched against the grant it belongs to. A holder whose lease expired and
/// whose key was re-granted cannot release the new holder's grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId(Uuid);

impl HolderId {
    /// Create a new random HolderId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved lock key
///
/// Always carries [`LOCK_PREFIX`]. Two calls whose keys compare equal share
/// one mutual-exclusion domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(String);

impl LockKey {
    /// Build a key from the resolved expression value
    pub fn new(resolved: impl AsRef<str>) -> Self {
        Self(format!("{}{}", LOCK_PREFIX, resolved.as_ref()))
    }

    /// Full key string including the prefix
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
