//! Failure Tests
//!
//! Business failures and store failures propagate unchanged, leave the stored
//! quantity untouched and never leave the lock held.

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use stratalock::{MemoryStore, Storage};
use strata_storage::testing::{FaultPlan, FaultyStore};

#[test]
fn decrease_below_zero_fails_for_every_strategy() {
    for strategy in UnitOfWorkStrategy::ALL {
        let service = seeded_service(5, Duration::ZERO);
        let err = service
            .decrease(strategy, LOCK_NAME, STOCK, 6)
            .unwrap_err();

        assert!(matches!(err, StrataError::InvariantViolation { .. }), "{}", strategy);
        assert!(err.is_business_failure());
        assert_eq!(service.quantity_of(STOCK).unwrap(), 5);
        assert_eq!(service.lock_metrics().released, 1);
    }
}

#[test]
fn exhausting_the_stock_rejects_the_rest() {
    let service = seeded_service(10, COMMIT_LATENCY);
    let tally = decrement_concurrently(&service, UnitOfWorkStrategy::CommitJoined);

    assert_eq!(tally.acquired(), 10);
    assert_eq!(tally.failed(), CALLERS - 10);
    assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
}

#[test]
fn decrease_to_exactly_zero_succeeds() {
    let service = seeded_service(3, Duration::ZERO);
    service
        .decrease(UnitOfWorkStrategy::PriorityReordered, LOCK_NAME, STOCK, 3)
        .unwrap();
    assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
}

#[test]
fn store_failure_propagates_and_releases_lock() {
    for strategy in UnitOfWorkStrategy::ALL {
        init_tracing();
        let store = Arc::new(FaultyStore::new(MemoryStore::new(), FaultPlan::Never));
        let backend = Arc::new(InMemoryLockBackend::new());
        let service = StockService::new(
            Arc::clone(&store) as Arc<dyn Storage>,
            backend.clone(),
            Arc::new(TemplateKeyResolver::new()),
        );
        service.create_stock(STOCK, ProductId::new(1), 10).unwrap();

        store.set_plan(FaultPlan::FailNext(1));
        let err = service
            .decrease(strategy, LOCK_NAME, STOCK, 1)
            .unwrap_err();

        assert!(matches!(err, StrataError::Storage { .. }), "{}", strategy);
        assert_eq!(store.injected_failures(), 1);
        assert_eq!(service.quantity_of(STOCK).unwrap(), 10);
        assert!(!backend.is_locked("LOCK:stock-ex"), "{} kept its lock", strategy);

        // The next call goes through normally
        service.decrease(strategy, LOCK_NAME, STOCK, 1).unwrap();
        assert_eq!(service.quantity_of(STOCK).unwrap(), 9);
    }
}

#[test]
fn unresolvable_key_fails_before_locking() {
    let service = seeded_service(10, Duration::ZERO);
    service
        .register(
            ProtectedOperation::new("bad_key", "#sku")
                .params(["lockName", "id", "quantity"])
                .strategy(UnitOfWorkStrategy::ForcedNested),
        )
        .unwrap();

    let err = service
        .call("bad_key", &CallOptions::default(), LOCK_NAME, STOCK, 1)
        .unwrap_err();
    assert!(matches!(err, StrataError::KeyResolution { .. }));
    assert_eq!(service.lock_metrics().granted, 0);
    assert_eq!(service.body_invocations(), 0);
}

#[test]
fn configured_service_runs_declared_operation() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("stratalock.toml");
    std::fs::write(
        &path,
        r#"
commit_latency_ms = 1

[[operation]]
name = "decrease_by_id"
key = "stock-#id"
strategy = "forced_nested"
"#,
    )
    .unwrap();

    let config = GuardConfig::from_file(&path).unwrap();
    let service = StockService::from_config(&config).unwrap();
    service.create_stock(STOCK, ProductId::new(1), 5).unwrap();

    let key = service
        .controller()
        .invoker()
        .resolve_key(
            &service.operation("decrease_by_id").unwrap(),
            &decrease_args(LOCK_NAME, 1),
        )
        .unwrap();
    assert_eq!(key.as_str(), "LOCK:stock-1");

    service
        .call("decrease_by_id", &CallOptions::default(), LOCK_NAME, STOCK, 2)
        .unwrap();
    assert_eq!(service.quantity_of(STOCK).unwrap(), 3);
}
