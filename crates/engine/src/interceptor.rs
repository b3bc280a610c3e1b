//! Interceptor chain around protected bodies
//!
//! Each cross-cutting concern (unit of work, lock) is an [`Interceptor`] that
//! wraps the rest of the chain. A chain is sorted by [`Interceptor::order`],
//! lowest first, with registration order breaking ties; the first interceptor
//! is the outermost.
//!
//! ```text
//! [TransactionInterceptor(0), LockInterceptor(0)]
//!     begin unit of work
//!         acquire lock
//!             body
//!         release lock
//!     commit                      <- after release: stale-read window
//!
//! [LockInterceptor(-1), TransactionInterceptor(0)]
//!     acquire lock
//!         begin unit of work
//!             body
//!         commit
//!     release lock
//! ```
//!
//! The unit of work an interceptor establishes is carried to the rest of the
//! chain in [`Invocation`]; the body receives the innermost one.

use crate::invoker::CriticalSectionInvoker;
use crate::operation::ProtectedOperation;
use std::fmt;
use std::sync::Arc;
use strata_concurrency::{TransactionManager, UnitOfWork};
use strata_core::{Interrupt, StrataError, StrataResult, Value};
use tracing::debug;

/// Protected body as seen by the chain
pub type Body<'b> = dyn FnMut(&UnitOfWork) -> StrataResult<()> + 'b;

/// How far a call got through the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proceed {
    /// The body ran
    Completed,
    /// The lock was not obtained within the wait time; the body did not run
    NotAcquired,
}

/// State of one protected call while it travels through the chain
pub struct Invocation<'a> {
    /// Operation being called
    pub operation: &'a ProtectedOperation,
    /// Call arguments
    pub args: &'a [Value],
    /// Interrupt token for the lock wait
    pub interrupt: &'a Interrupt,
    unit_of_work: Option<UnitOfWork>,
}

impl<'a> Invocation<'a> {
    /// Start an invocation with no ambient unit of work
    pub fn new(operation: &'a ProtectedOperation, args: &'a [Value], interrupt: &'a Interrupt) -> Self {
        Self {
            operation,
            args,
            interrupt,
            unit_of_work: None,
        }
    }

    /// Start inside the caller's unit of work
    pub fn with_ambient(mut self, ambient: Option<UnitOfWork>) -> Self {
        self.unit_of_work = ambient;
        self
    }

    /// Unit of work in effect at this point of the chain
    pub fn unit_of_work(&self) -> Option<&UnitOfWork> {
        self.unit_of_work.as_ref()
    }

    /// Run `f` with `uow` in effect, restoring the previous one afterwards
    pub fn scoped<T>(&mut self, uow: &UnitOfWork, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.unit_of_work.replace(uow.clone());
        let result = f(self);
        self.unit_of_work = previous;
        result
    }
}

/// Wraps the rest of a chain
pub trait Interceptor: Send + Sync {
    /// Name used in logs and chain descriptions
    fn name(&self) -> &'static str;

    /// Position in the chain; lower runs further out
    fn order(&self) -> i32 {
        0
    }

    /// Do this interceptor's work around `next`
    ///
    /// # Errors
    ///
    /// Errors from the rest of the chain propagate; an interceptor only adds
    /// its own.
    fn around(&self, invocation: &mut Invocation<'_>, next: Next<'_, '_>) -> StrataResult<Proceed>;
}

/// The remainder of a chain
pub struct Next<'c, 'b> {
    rest: &'c [Arc<dyn Interceptor>],
    body: &'c mut Body<'b>,
}

impl Next<'_, '_> {
    /// Run the remaining interceptors, then the body
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the body is reached with no unit of work in
    /// effect.
    pub fn proceed(self, invocation: &mut Invocation<'_>) -> StrataResult<Proceed> {
        match self.rest.split_first() {
            Some((head, rest)) => head.around(
                invocation,
                Next {
                    rest,
                    body: self.body,
                },
            ),
            None => {
                let uow = invocation.unit_of_work.clone().ok_or_else(|| {
                    StrataError::internal(format!(
                        "protected body of '{}' reached without a unit of work",
                        invocation.operation.name
                    ))
                })?;
                (self.body)(&uow)?;
                Ok(Proceed::Completed)
            }
        }
    }
}

/// Ordered interceptors
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Build a chain; interceptors are stably sorted by order
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        let mut chain = Self { interceptors };
        chain.interceptors.sort_by_key(|i| i.order());
        chain
    }

    /// Append an interceptor and re-sort
    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.order());
        self
    }

    /// Interceptor names, outermost first
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run `body` through the chain
    ///
    /// # Errors
    ///
    /// Propagates any interceptor or body error.
    pub fn run(&self, invocation: &mut Invocation<'_>, body: &mut Body<'_>) -> StrataResult<Proceed> {
        Next {
            rest: &self.interceptors,
            body,
        }
        .proceed(invocation)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Unit-of-work interceptor with REQUIRED propagation
///
/// Joins the unit of work already in effect. If there is none, begins one,
/// runs the rest of the chain in it and commits on success or rolls back on
/// error before returning.
pub struct TransactionInterceptor {
    manager: Arc<TransactionManager>,
    order: i32,
}

impl TransactionInterceptor {
    /// Create at order 0
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self { manager, order: 0 }
    }

    /// Override the order
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl Interceptor for TransactionInterceptor {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn around(&self, invocation: &mut Invocation<'_>, next: Next<'_, '_>) -> StrataResult<Proceed> {
        let ambient = invocation.unit_of_work.clone();
        self.manager.required(ambient.as_ref(), |uow| {
            invocation.scoped(uow, |inv| next.proceed(inv))
        })
    }
}

/// Relationship between a held lock and the unit of work of the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Release when the rest of the chain returns; whatever unit of work is
    /// in effect commits wherever its owner commits it
    Ambient,
    /// Run the rest of the chain in a new unit of work committed before the
    /// lock is released
    RequiresNew,
    /// Bind the guard to the unit of work in effect (or a new one) so it is
    /// released by that unit of work's commit or rollback
    CommitJoined,
}

/// Lock interceptor
pub struct LockInterceptor {
    invoker: Arc<CriticalSectionInvoker>,
    manager: Arc<TransactionManager>,
    scope: LockScope,
    order: i32,
}

impl LockInterceptor {
    /// Create at order 0
    pub fn new(
        invoker: Arc<CriticalSectionInvoker>,
        manager: Arc<TransactionManager>,
        scope: LockScope,
    ) -> Self {
        Self {
            invoker,
            manager,
            scope,
            order: 0,
        }
    }

    /// Override the order
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Scope of this interceptor
    pub fn scope(&self) -> LockScope {
        self.scope
    }
}

impl Interceptor for LockInterceptor {
    fn name(&self) -> &'static str {
        match self.scope {
            LockScope::Ambient => "lock",
            LockScope::RequiresNew => "lock+requires_new",
            LockScope::CommitJoined => "lock+commit_joined",
        }
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn around(&self, invocation: &mut Invocation<'_>, next: Next<'_, '_>) -> StrataResult<Proceed> {
        let guard = match self
            .invoker
            .acquire(invocation.operation, invocation.args, invocation.interrupt)?
        {
            Some(guard) => guard,
            None => return Ok(Proceed::NotAcquired),
        };

        match self.scope {
            LockScope::Ambient => {
                let result = next.proceed(invocation);
                drop(guard);
                result
            }
            LockScope::RequiresNew => {
                let result = self
                    .manager
                    .requires_new(|uow| invocation.scoped(uow, |inv| next.proceed(inv)));
                drop(guard);
                result
            }
            LockScope::CommitJoined => match invocation.unit_of_work.clone() {
                Some(uow) => {
                    debug!(
                        operation = %invocation.operation.name,
                        txn_id = uow.txn_id(),
                        key = %guard.key(),
                        "Lock bound to unit of work"
                    );
                    uow.bind_lock(guard)?;
                    next.proceed(invocation)
                }
                None => self.manager.transaction(|uow| {
                    uow.bind_lock(guard)?;
                    invocation.scoped(uow, |inv| next.proceed(inv))
                }),
            },
        }
    }
}
