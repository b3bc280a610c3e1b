//! Unit-of-work boundary controller
//!
//! Owns one interceptor chain per [`UnitOfWorkStrategy`] and runs protected
//! bodies through the chain their operation selects.
//!
//! | Strategy | Chain, outermost first |
//! |---|---|
//! | `Embedded` | transaction(0), lock(0) |
//! | `ForcedNested` | transaction(0), lock+requires_new(0) |
//! | `PriorityReordered` | lock(-1), transaction(0) |
//! | `CommitJoined` | transaction(0), lock+commit_joined(0) |
//!
//! `Embedded` and `PriorityReordered` use the very same interceptors; only the
//! lock interceptor's order differs. [`BoundaryController::execute_with_chain`]
//! accepts any other arrangement.

use crate::interceptor::{
    Interceptor, InterceptorChain, Invocation, LockInterceptor, LockScope, Proceed,
    TransactionInterceptor,
};
use crate::invoker::{Acquisition, CriticalSectionInvoker};
use crate::operation::{ProtectedOperation, UnitOfWorkStrategy};
use std::sync::Arc;
use strata_concurrency::{TransactionManager, UnitOfWork};
use strata_core::{Interrupt, StrataError, StrataResult, Value};
use tracing::debug;

/// Order given to the lock interceptor by `PriorityReordered`
pub const LOCK_FIRST_ORDER: i32 = -1;

/// Runs protected bodies under their operation's strategy
pub struct BoundaryController {
    manager: Arc<TransactionManager>,
    invoker: Arc<CriticalSectionInvoker>,
    embedded: InterceptorChain,
    forced_nested: InterceptorChain,
    priority_reordered: InterceptorChain,
    commit_joined: InterceptorChain,
}

impl BoundaryController {
    /// Build the chain of every strategy
    pub fn new(manager: Arc<TransactionManager>, invoker: Arc<CriticalSectionInvoker>) -> Self {
        let mut controller = Self {
            manager,
            invoker,
            embedded: InterceptorChain::default(),
            forced_nested: InterceptorChain::default(),
            priority_reordered: InterceptorChain::default(),
            commit_joined: InterceptorChain::default(),
        };
        controller.embedded = controller.build_chain(UnitOfWorkStrategy::Embedded);
        controller.forced_nested = controller.build_chain(UnitOfWorkStrategy::ForcedNested);
        controller.priority_reordered =
            controller.build_chain(UnitOfWorkStrategy::PriorityReordered);
        controller.commit_joined = controller.build_chain(UnitOfWorkStrategy::CommitJoined);
        controller
    }

    /// Transaction interceptor at `order`
    pub fn transaction_interceptor(&self, order: i32) -> Arc<dyn Interceptor> {
        Arc::new(TransactionInterceptor::new(Arc::clone(&self.manager)).with_order(order))
    }

    /// Lock interceptor with `scope` at `order`
    pub fn lock_interceptor(&self, scope: LockScope, order: i32) -> Arc<dyn Interceptor> {
        Arc::new(
            LockInterceptor::new(Arc::clone(&self.invoker), Arc::clone(&self.manager), scope)
                .with_order(order),
        )
    }

    fn build_chain(&self, strategy: UnitOfWorkStrategy) -> InterceptorChain {
        let (scope, lock_order) = match strategy {
            UnitOfWorkStrategy::Embedded => (LockScope::Ambient, 0),
            UnitOfWorkStrategy::ForcedNested => (LockScope::RequiresNew, 0),
            UnitOfWorkStrategy::PriorityReordered => (LockScope::Ambient, LOCK_FIRST_ORDER),
            UnitOfWorkStrategy::CommitJoined => (LockScope::CommitJoined, 0),
        };
        InterceptorChain::new(vec![
            self.transaction_interceptor(0),
            self.lock_interceptor(scope, lock_order),
        ])
    }

    /// Chain used for `strategy`
    pub fn chain(&self, strategy: UnitOfWorkStrategy) -> &InterceptorChain {
        match strategy {
            UnitOfWorkStrategy::Embedded => &self.embedded,
            UnitOfWorkStrategy::ForcedNested => &self.forced_nested,
            UnitOfWorkStrategy::PriorityReordered => &self.priority_reordered,
            UnitOfWorkStrategy::CommitJoined => &self.commit_joined,
        }
    }

    /// Transaction manager
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Critical-section invoker
    pub fn invoker(&self) -> &Arc<CriticalSectionInvoker> {
        &self.invoker
    }

    /// Run `body` as `operation` under the operation's strategy
    ///
    /// `ambient` is the caller's unit of work, if any; strategies that join
    /// the ambient unit of work leave its commit to the caller.
    ///
    /// # Errors
    ///
    /// Key resolution, interrupt, body and commit errors propagate. A lock
    /// that could not be obtained is `Ok(Acquisition::NotAcquired)`.
    pub fn execute<T, F>(
        &self,
        operation: &ProtectedOperation,
        args: &[Value],
        interrupt: &Interrupt,
        ambient: Option<&UnitOfWork>,
        body: F,
    ) -> StrataResult<Acquisition<T>>
    where
        F: FnOnce(&UnitOfWork) -> StrataResult<T>,
    {
        let chain = self.chain(operation.strategy);
        self.execute_with_chain(chain, operation, args, interrupt, ambient, body)
    }

    /// Run `body` as `operation` through an explicit chain
    ///
    /// # Errors
    ///
    /// As [`BoundaryController::execute`].
    pub fn execute_with_chain<T, F>(
        &self,
        chain: &InterceptorChain,
        operation: &ProtectedOperation,
        args: &[Value],
        interrupt: &Interrupt,
        ambient: Option<&UnitOfWork>,
        body: F,
    ) -> StrataResult<Acquisition<T>>
    where
        F: FnOnce(&UnitOfWork) -> StrataResult<T>,
    {
        debug!(
            operation = %operation.name,
            strategy = %operation.strategy,
            chain = ?chain,
            "Executing protected operation"
        );

        let mut body = Some(body);
        let mut output = None;
        let mut run = |uow: &UnitOfWork| -> StrataResult<()> {
            let f = body
                .take()
                .ok_or_else(|| StrataError::internal("protected body entered twice"))?;
            output = Some(f(uow)?);
            Ok(())
        };

        let mut invocation = Invocation::new(operation, args, interrupt).with_ambient(ambient.cloned());
        match chain.run(&mut invocation, &mut run)? {
            Proceed::Completed => output.map(Acquisition::Acquired).ok_or_else(|| {
                StrataError::internal(format!(
                    "chain for '{}' completed without running the body",
                    operation.name
                ))
            }),
            Proceed::NotAcquired => Ok(Acquisition::NotAcquired),
        }
    }
}
