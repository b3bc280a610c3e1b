//! Stock service
//!
//! Lock-protected stock decrements, one registered operation per strategy:
//!
//! | Operation | Strategy |
//! |---|---|
//! | `decrease_embedded` | `Embedded` |
//! | `decrease_forced_nested` | `ForcedNested` |
//! | `decrease_priority_reordered` | `PriorityReordered` |
//! | `decrease_commit_joined` | `CommitJoined` |
//!
//! All take `(lockName, id, quantity)` and lock on `#lockName`, so callers
//! that pass the same lock name serialize on the same key. More operations
//! can be registered directly or declared in `stratalock.toml`.

use crate::boundary::BoundaryController;
use crate::config::GuardConfig;
use crate::invoker::{Acquisition, CriticalSectionInvoker};
use crate::operation::{ProtectedOperation, UnitOfWorkStrategy};
use crate::resolver::TemplateKeyResolver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_concurrency::{
    InMemoryLockBackend, LockCoordinator, LockMetrics, TransactionManager, TransactionMetrics,
    UnitOfWork,
};
use strata_core::traits::{KeyResolver, LockBackend, Storage};
use strata_core::{Interrupt, ProductId, Stock, StockId, StrataError, StrataResult, Value};
use strata_storage::MemoryStore;
use tracing::{debug, info};

/// Parameter names of every decrease operation
pub const DECREASE_PARAMS: [&str; 3] = ["lockName", "id", "quantity"];

/// Key expression of the built-in decrease operations
pub const DECREASE_KEY: &str = "#lockName";

/// Name of the built-in decrease operation for `strategy`
pub fn decrease_operation_name(strategy: UnitOfWorkStrategy) -> String {
    format!("decrease_{}", strategy)
}

/// Per-call context for protected calls
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Caller's unit of work, joined by strategies with ambient scope
    pub ambient: Option<UnitOfWork>,
    /// Interrupts the lock wait when fired
    pub interrupt: Interrupt,
}

impl CallOptions {
    /// Run inside `ambient`
    pub fn with_ambient(mut self, ambient: UnitOfWork) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// Use `interrupt` for the lock wait
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// Stock operations guarded by keyed locks
pub struct StockService {
    controller: BoundaryController,
    operations: RwLock<HashMap<String, ProtectedOperation>>,
    body_invocations: AtomicU64,
}

impl StockService {
    /// Assemble a service over the given collaborators
    pub fn new(
        storage: Arc<dyn Storage>,
        backend: Arc<dyn LockBackend>,
        resolver: Arc<dyn KeyResolver>,
    ) -> Self {
        let manager = Arc::new(TransactionManager::new(storage));
        let coordinator = Arc::new(LockCoordinator::new(backend));
        let invoker = Arc::new(CriticalSectionInvoker::new(resolver, coordinator));

        let operations: HashMap<String, ProtectedOperation> = UnitOfWorkStrategy::ALL
            .into_iter()
            .map(|strategy| {
                let op = ProtectedOperation::new(decrease_operation_name(strategy), DECREASE_KEY)
                    .params(DECREASE_PARAMS)
                    .strategy(strategy);
                (op.name.clone(), op)
            })
            .collect();

        Self {
            controller: BoundaryController::new(manager, invoker),
            operations: RwLock::new(operations),
            body_invocations: AtomicU64::new(0),
        }
    }

    /// In-memory store, lock backend and template resolver
    pub fn in_memory() -> Self {
        Self::in_memory_with_latency(Duration::ZERO)
    }

    /// In-memory service whose store takes `commit_latency` per commit
    pub fn in_memory_with_latency(commit_latency: Duration) -> Self {
        Self::new(
            Arc::new(MemoryStore::with_commit_latency(commit_latency)),
            Arc::new(InMemoryLockBackend::new()),
            Arc::new(TemplateKeyResolver::new()),
        )
    }

    /// In-memory service configured from `config`
    ///
    /// Declared operations are registered next to the built-in ones and
    /// replace a built-in of the same name. Their parameters must match
    /// [`DECREASE_PARAMS`] in number.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the config does not validate.
    pub fn from_config(config: &GuardConfig) -> StrataResult<Self> {
        config.validate()?;
        let service = Self::in_memory_with_latency(config.commit_latency());
        for operation in config.operations()? {
            if operation.params.len() != DECREASE_PARAMS.len() {
                return Err(StrataError::invalid_input(format!(
                    "operation '{}' declares {} parameters, decrease takes {}",
                    operation.name,
                    operation.params.len(),
                    DECREASE_PARAMS.len()
                )));
            }
            service.register(operation)?;
        }
        info!(
            operations = service.operations.read().len(),
            commit_latency_ms = config.commit_latency_ms,
            "Stock service configured"
        );
        Ok(service)
    }

    /// Register or replace an operation
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the declaration does not validate.
    pub fn register(&self, operation: ProtectedOperation) -> StrataResult<()> {
        operation.validate()?;
        debug!(
            operation = %operation.name,
            strategy = %operation.strategy,
            key = %operation.key,
            "Registered protected operation"
        );
        self.operations
            .write()
            .insert(operation.name.clone(), operation);
        Ok(())
    }

    /// Registered operation by name
    pub fn operation(&self, name: &str) -> Option<ProtectedOperation> {
        self.operations.read().get(name).cloned()
    }

    /// Create or overwrite a stock, committed immediately
    ///
    /// # Errors
    ///
    /// Returns the storage error if the commit fails.
    pub fn create_stock(&self, id: StockId, product_id: ProductId, quantity: u64) -> StrataResult<()> {
        self.manager()
            .transaction(|uow| uow.save_and_flush(&Stock::new(id, product_id, quantity)))
    }

    /// Committed quantity of a stock
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the stock does not exist.
    pub fn quantity_of(&self, id: StockId) -> StrataResult<u64> {
        self.manager()
            .storage()
            .get(id)?
            .map(|committed| committed.stock.quantity())
            .ok_or(StrataError::NotFound { id })
    }

    /// Decrease a stock under `strategy`, locking on `lock_name`
    ///
    /// Returns `NotAcquired` when the lock stayed contended for the whole
    /// wait; the stock is untouched in that case.
    ///
    /// # Errors
    ///
    /// - `InvariantViolation` if the stock holds less than `quantity`
    /// - `NotFound` if the stock does not exist
    /// - `LockInterrupted`, storage and commit errors
    pub fn decrease(
        &self,
        strategy: UnitOfWorkStrategy,
        lock_name: &str,
        id: StockId,
        quantity: u64,
    ) -> StrataResult<Acquisition<()>> {
        self.decrease_within(&CallOptions::default(), strategy, lock_name, id, quantity)
    }

    /// [`StockService::decrease`] with a caller-supplied context
    ///
    /// # Errors
    ///
    /// As [`StockService::decrease`].
    pub fn decrease_within(
        &self,
        options: &CallOptions,
        strategy: UnitOfWorkStrategy,
        lock_name: &str,
        id: StockId,
        quantity: u64,
    ) -> StrataResult<Acquisition<()>> {
        self.call(
            &decrease_operation_name(strategy),
            options,
            lock_name,
            id,
            quantity,
        )
    }

    /// Decrease a stock through the registered operation `name`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown operation, otherwise as
    /// [`StockService::decrease`].
    pub fn call(
        &self,
        name: &str,
        options: &CallOptions,
        lock_name: &str,
        id: StockId,
        quantity: u64,
    ) -> StrataResult<Acquisition<()>> {
        let operation = self
            .operation(name)
            .ok_or_else(|| StrataError::invalid_input(format!("unknown operation '{}'", name)))?;
        let args = [Value::from(lock_name), Value::from(id.as_u64()), Value::from(quantity)];

        self.controller.execute(
            &operation,
            &args,
            &options.interrupt,
            options.ambient.as_ref(),
            |uow| self.decrease_body(uow, id, quantity),
        )
    }

    fn decrease_body(&self, uow: &UnitOfWork, id: StockId, quantity: u64) -> StrataResult<()> {
        self.body_invocations.fetch_add(1, Ordering::Relaxed);
        let mut stock = uow.get_by_id(id)?;
        stock.decrease(quantity)?;
        uow.save_and_flush(&stock)
    }

    /// Number of times a protected body has started
    pub fn body_invocations(&self) -> u64 {
        self.body_invocations.load(Ordering::Relaxed)
    }

    /// Transaction manager, for ambient units of work
    pub fn manager(&self) -> &Arc<TransactionManager> {
        self.controller.manager()
    }

    /// Lock coordinator
    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        self.controller.invoker().coordinator()
    }

    /// Boundary controller
    pub fn controller(&self) -> &BoundaryController {
        &self.controller
    }

    /// Lock counters
    pub fn lock_metrics(&self) -> LockMetrics {
        self.coordinator().metrics()
    }

    /// Transaction counters
    pub fn transaction_metrics(&self) -> TransactionMetrics {
        self.manager().metrics()
    }
}
