//! Guarded-call engine for stratalock
//!
//! This crate composes the lower layers into lock-protected operations:
//! - TemplateKeyResolver: lock keys from call arguments
//! - CriticalSectionInvoker: resolve, acquire, run, release
//! - Interceptor chain: unit-of-work and lock interceptors, ordered explicitly
//! - BoundaryController: one chain per UnitOfWorkStrategy
//! - StockService: the protected stock decrements
//! - GuardConfig: `stratalock.toml`
//!
//! The engine is the only component that knows how a lock's held window and
//! a unit of work's commit are placed relative to each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod config;
pub mod interceptor;
pub mod invoker;
pub mod operation;
pub mod resolver;
pub mod service;

pub use boundary::{BoundaryController, LOCK_FIRST_ORDER};
pub use config::{GuardConfig, OperationConfig, CONFIG_FILE_NAME};
pub use interceptor::{
    Interceptor, InterceptorChain, Invocation, LockInterceptor, LockScope, Next, Proceed,
    TransactionInterceptor,
};
pub use invoker::{Acquisition, CriticalSectionInvoker};
pub use operation::{ProtectedOperation, UnitOfWorkStrategy, DEFAULT_LEASE, DEFAULT_WAIT};
pub use resolver::TemplateKeyResolver;
pub use service::{decrease_operation_name, CallOptions, StockService, DECREASE_KEY, DECREASE_PARAMS};
