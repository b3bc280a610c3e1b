//! Critical-section invoker
//!
//! Resolves a protected call's lock key, acquires the lock with the
//! operation's wait and lease, runs the body and releases the lock on every
//! exit path.
//!
//! Contention is not an error: a lock that could not be obtained within the
//! wait time yields [`Acquisition::NotAcquired`] and the body never runs. An
//! interrupted wait is an error and propagates.

use crate::operation::ProtectedOperation;
use std::sync::Arc;
use strata_concurrency::{LockCoordinator, LockGuard};
use strata_core::traits::KeyResolver;
use strata_core::{Interrupt, LockKey, StrataResult, Value};
use tracing::debug;

/// Result of a protected call
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Acquisition<T> {
    /// The lock was granted and the body ran to completion
    Acquired(T),
    /// The wait elapsed; the body did not run
    NotAcquired,
}

impl<T> Acquisition<T> {
    /// True if the body ran
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquisition::Acquired(_))
    }

    /// The body's value, if it ran
    pub fn into_option(self) -> Option<T> {
        match self {
            Acquisition::Acquired(value) => Some(value),
            Acquisition::NotAcquired => None,
        }
    }
}

/// Key resolution plus scoped lock acquisition
pub struct CriticalSectionInvoker {
    resolver: Arc<dyn KeyResolver>,
    coordinator: Arc<LockCoordinator>,
}

impl CriticalSectionInvoker {
    /// Create an invoker
    pub fn new(resolver: Arc<dyn KeyResolver>, coordinator: Arc<LockCoordinator>) -> Self {
        Self {
            resolver,
            coordinator,
        }
    }

    /// Lock coordinator
    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    /// Lock key of a call
    ///
    /// # Errors
    ///
    /// Returns `KeyResolution` if the key expression does not resolve against
    /// `args`.
    pub fn resolve_key(&self, operation: &ProtectedOperation, args: &[Value]) -> StrataResult<LockKey> {
        let resolved = self
            .resolver
            .resolve(&operation.param_names(), args, &operation.key)?;
        Ok(LockKey::new(resolved))
    }

    /// Resolve and acquire; `None` when the wait elapsed
    ///
    /// # Errors
    ///
    /// Returns `KeyResolution` before any acquisition is attempted, or
    /// `LockInterrupted` if `interrupt` fires while waiting.
    pub fn acquire(
        &self,
        operation: &ProtectedOperation,
        args: &[Value],
        interrupt: &Interrupt,
    ) -> StrataResult<Option<LockGuard>> {
        let key = self.resolve_key(operation, args)?;
        let guard = self
            .coordinator
            .acquire(&key, operation.wait, operation.lease, interrupt)?
            .into_guard();
        if guard.is_none() {
            debug!(operation = %operation.name, key = %key, "Protected call not acquired");
        }
        Ok(guard)
    }

    /// Run `body` while holding the operation's lock
    ///
    /// No unit of work is involved; the lock is released as soon as `body`
    /// returns. Errors from `body` propagate unchanged.
    pub fn invoke<T, F>(
        &self,
        operation: &ProtectedOperation,
        args: &[Value],
        interrupt: &Interrupt,
        body: F,
    ) -> StrataResult<Acquisition<T>>
    where
        F: FnOnce(&LockGuard) -> StrataResult<T>,
    {
        let Some(guard) = self.acquire(operation, args, interrupt)? else {
            return Ok(Acquisition::NotAcquired);
        };
        let value = body(&guard)?;
        Ok(Acquisition::Acquired(value))
    }
}
