//! Interrupt token for threads blocked on lock acquisition
//!
//! Rust threads cannot be interrupted from the outside, so a caller that wants
//! to abandon a blocked `acquire` hands the backend an [`Interrupt`] and fires
//! it from another thread. Backends observe the flag while waiting and report
//! `StrataError::LockInterrupted`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, cloneable interrupt flag
///
/// Once fired, an interrupt stays fired. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    fired: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create a token that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the interrupt
    pub fn interrupt(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// True once `interrupt` has been called on this token or any clone
    pub fn is_interrupted(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
