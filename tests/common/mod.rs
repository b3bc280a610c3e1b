//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
pub use stratalock::{
    Acquisition, CallOptions, GuardConfig, InMemoryLockBackend, Interrupt, LockKey, LockScope,
    ProductId, ProtectedOperation, StockId, StockService, StrataError, StrataResult,
    TemplateKeyResolver, UnitOfWork, UnitOfWorkStrategy, Value,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's captured writer.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::WARN)
            .try_init();
    });
}

// ============================================================================
// Scenario constants
// ============================================================================

/// Stock every scenario decrements
pub const STOCK: StockId = StockId::new(1);

/// Initial quantity
pub const INITIAL_QUANTITY: u64 = 100;

/// Concurrent decrement-by-one callers
pub const CALLERS: u64 = 100;

/// Worker pool size
pub const POOL_SIZE: usize = 32;

/// Store commit latency used by the contention scenarios
pub const COMMIT_LATENCY: Duration = Duration::from_millis(2);

/// Trials attempted when a scenario is expected to race
pub const RACE_TRIALS: usize = 10;

/// Lock name shared by all callers of a scenario
pub const LOCK_NAME: &str = "stock-ex";

// ============================================================================
// Fixtures
// ============================================================================

/// Fixed-size worker pool
pub fn worker_pool() -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(POOL_SIZE)
        .build()
        .expect("Failed to build worker pool")
}

/// In-memory service with one stock at `quantity`
pub fn seeded_service(quantity: u64, commit_latency: Duration) -> Arc<StockService> {
    init_tracing();
    let service = StockService::in_memory_with_latency(commit_latency);
    service
        .create_stock(STOCK, ProductId::new(1), quantity)
        .expect("Failed to create stock");
    Arc::new(service)
}

/// Service set up for the 100-caller scenario
pub fn scenario_service() -> Arc<StockService> {
    seeded_service(INITIAL_QUANTITY, COMMIT_LATENCY)
}

/// Outcome counts of a batch of concurrent calls
#[derive(Debug, Default)]
pub struct Tally {
    pub acquired: AtomicU64,
    pub not_acquired: AtomicU64,
    pub failed: AtomicU64,
}

impl Tally {
    pub fn record<T>(&self, result: &StrataResult<Acquisition<T>>) {
        let counter = match result {
            Ok(Acquisition::Acquired(_)) => &self.acquired,
            Ok(Acquisition::NotAcquired) => &self.not_acquired,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn not_acquired(&self) -> u64 {
        self.not_acquired.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Run `CALLERS` copies of `call` on a `POOL_SIZE` pool and wait for all
pub fn run_callers<F, T>(call: F) -> Tally
where
    F: Fn(u64) -> StrataResult<Acquisition<T>> + Sync,
{
    let pool = worker_pool();
    let tally = Tally::default();
    pool.scope(|scope| {
        for caller in 0..CALLERS {
            let call = &call;
            let tally = &tally;
            scope.spawn(move |_| tally.record(&call(caller)));
        }
    });
    tally
}

/// `CALLERS` concurrent decrement-by-one calls under `strategy`
pub fn decrement_concurrently(service: &StockService, strategy: UnitOfWorkStrategy) -> Tally {
    run_callers(|_| service.decrease(strategy, LOCK_NAME, STOCK, 1))
}

/// Load-mutate-persist decrement, for bodies driven through custom chains
pub fn decrement(uow: &UnitOfWork, amount: u64) -> StrataResult<()> {
    let mut stock = uow.get_by_id(STOCK)?;
    stock.decrease(amount)?;
    uow.save_and_flush(&stock)
}

/// Arguments of a decrease call
pub fn decrease_args(lock_name: &str, quantity: u64) -> Vec<Value> {
    vec![
        Value::from(lock_name),
        Value::from(STOCK.as_u64()),
        Value::from(quantity),
    ]
}
