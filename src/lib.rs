//! stratalock - keyed critical sections with explicit commit boundaries
//!
//! A protected operation resolves a lock key from its arguments, acquires a
//! distributed lock with a wait and a lease, and runs a load-mutate-persist
//! body in a unit of work. The [`UnitOfWorkStrategy`] decides whether that
//! unit of work commits before the lock is released.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratalock::{ProductId, StockId, StockService, UnitOfWorkStrategy};
//!
//! let service = StockService::in_memory();
//! service.create_stock(StockId::new(1), ProductId::new(1), 100)?;
//!
//! let acquired = service.decrease(UnitOfWorkStrategy::CommitJoined, "stock-1", StockId::new(1), 1)?;
//! assert!(acquired.is_acquired());
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: entity, identities, errors and collaborator traits
//! - `strata-storage`: in-memory committed store
//! - `strata-concurrency`: units of work, lock coordinator and lock backend
//! - `strata-engine`: interceptors, boundary strategies, service and config

pub use strata_concurrency::{
    Acquire, InMemoryLockBackend, LockCoordinator, LockGuard, LockMetrics, TransactionManager,
    TransactionMetrics, TransactionStatus, UnitOfWork,
};
pub use strata_core::{
    HolderId, Interrupt, KeyResolver, LockBackend, LockKey, ProductId, Stock, StockId, Storage,
    StrataError, StrataResult, Value,
};
pub use strata_engine::{
    Acquisition, BoundaryController, CallOptions, CriticalSectionInvoker, GuardConfig,
    Interceptor, InterceptorChain, LockScope, ProtectedOperation, StockService,
    TemplateKeyResolver, UnitOfWorkStrategy,
};
pub use strata_storage::MemoryStore;
