//! Release Tests
//!
//! Releasing a lock the caller no longer owns is silent and never disturbs
//! the next holder. A lease that runs out mid-call is only fatal to
//! CommitJoined, which checks it before committing.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stratalock::MemoryStore;

fn service_with_backend(quantity: u64) -> (StockService, Arc<InMemoryLockBackend>) {
    init_tracing();
    let backend = Arc::new(InMemoryLockBackend::new());
    let service = StockService::new(
        Arc::new(MemoryStore::new()),
        backend.clone(),
        Arc::new(TemplateKeyResolver::new()),
    );
    service.create_stock(STOCK, ProductId::new(1), quantity).unwrap();
    (service, backend)
}

fn short_lease(strategy: UnitOfWorkStrategy) -> ProtectedOperation {
    ProtectedOperation::new("short_lease", "#lockName")
        .params(["lockName", "id", "quantity"])
        .lease(Duration::from_millis(10))
        .strategy(strategy)
}

#[test]
fn release_after_lease_expiry_is_silent() {
    let (service, backend) = service_with_backend(10);
    let stale = service
        .coordinator()
        .acquire(
            &LockKey::new(LOCK_NAME),
            Duration::ZERO,
            Duration::from_millis(10),
            &Interrupt::new(),
        )
        .unwrap()
        .into_guard()
        .unwrap();
    thread::sleep(Duration::from_millis(30));

    // Another caller takes the expired lock over and finishes
    let result = service
        .decrease(UnitOfWorkStrategy::CommitJoined, LOCK_NAME, STOCK, 1)
        .unwrap();
    assert!(result.is_acquired());

    // A third caller holds it now; the stale release must not free it
    let current = service
        .coordinator()
        .acquire(
            &LockKey::new(LOCK_NAME),
            Duration::ZERO,
            Duration::from_secs(10),
            &Interrupt::new(),
        )
        .unwrap()
        .into_guard()
        .unwrap();
    stale.release();

    assert!(current.is_lease_valid());
    assert!(backend.is_locked("LOCK:stock-ex"));
    assert_eq!(service.lock_metrics().release_failures, 1);
    assert_eq!(service.quantity_of(STOCK).unwrap(), 9);
}

#[test]
fn release_is_not_repeated() {
    let (service, backend) = service_with_backend(10);
    for _ in 0..3 {
        service
            .decrease(UnitOfWorkStrategy::ForcedNested, LOCK_NAME, STOCK, 1)
            .unwrap();
    }
    let metrics = service.lock_metrics();
    assert_eq!(metrics.granted, 3);
    assert_eq!(metrics.released, 3);
    assert_eq!(metrics.release_failures, 0);
    assert_eq!(backend.held_count(), 0);
}

#[test]
fn expired_lease_is_logged_not_surfaced_when_release_follows_commit() {
    for strategy in [UnitOfWorkStrategy::ForcedNested, UnitOfWorkStrategy::PriorityReordered] {
        let (service, backend) = service_with_backend(10);
        let result = service
            .controller()
            .execute(
                &short_lease(strategy),
                &decrease_args(LOCK_NAME, 1),
                &Interrupt::new(),
                None,
                |uow| {
                    thread::sleep(Duration::from_millis(30));
                    decrement(uow, 1)
                },
            )
            .unwrap();

        assert!(result.is_acquired(), "{}", strategy);
        assert_eq!(service.quantity_of(STOCK).unwrap(), 9);
        assert_eq!(service.lock_metrics().release_failures, 1);
        assert!(!backend.is_locked("LOCK:stock-ex"));
    }
}

#[test]
fn commit_joined_refuses_to_commit_after_lease_expiry() {
    let (service, backend) = service_with_backend(10);
    let err = service
        .controller()
        .execute(
            &short_lease(UnitOfWorkStrategy::CommitJoined),
            &decrease_args(LOCK_NAME, 1),
            &Interrupt::new(),
            None,
            |uow| {
                thread::sleep(Duration::from_millis(30));
                decrement(uow, 1)
            },
        )
        .unwrap_err();

    assert!(matches!(err, StrataError::LeaseExpired { .. }));
    assert_eq!(service.quantity_of(STOCK).unwrap(), 10);
    assert!(!backend.is_locked("LOCK:stock-ex"));
}
