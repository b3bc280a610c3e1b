//! Contention Tests
//!
//! A lock that cannot be obtained within the wait time is a normal outcome;
//! an interrupted wait is a failure.

use crate::common::*;
use std::thread;
use std::time::{Duration, Instant};

const HOLD: Duration = Duration::from_secs(10);

fn hold_lock(service: &StockService) -> stratalock::LockGuard {
    service
        .coordinator()
        .acquire(&LockKey::new(LOCK_NAME), Duration::ZERO, HOLD, &Interrupt::new())
        .unwrap()
        .into_guard()
        .unwrap()
}

fn short_wait(strategy: UnitOfWorkStrategy) -> ProtectedOperation {
    ProtectedOperation::new(format!("short_wait_{}", strategy), "#lockName")
        .params(["lockName", "id", "quantity"])
        .wait(Duration::from_millis(30))
        .strategy(strategy)
}

#[test]
fn timeout_returns_not_acquired_without_running_body() {
    let service = seeded_service(10, Duration::ZERO);
    let _held = hold_lock(&service);

    for strategy in UnitOfWorkStrategy::ALL {
        let op = short_wait(strategy);
        service.register(op.clone()).unwrap();

        let start = Instant::now();
        let result = service
            .call(&op.name, &CallOptions::default(), LOCK_NAME, STOCK, 1)
            .unwrap();
        assert_eq!(result, Acquisition::NotAcquired, "{}", strategy);
        assert!(start.elapsed() >= op.wait);
    }

    assert_eq!(service.body_invocations(), 0);
    assert_eq!(service.quantity_of(STOCK).unwrap(), 10);
    assert_eq!(service.lock_metrics().timed_out, 4);
}

#[test]
fn waiter_proceeds_after_holder_releases() {
    let service = seeded_service(10, Duration::ZERO);
    let held = hold_lock(&service);

    let waiter = {
        let service = std::sync::Arc::clone(&service);
        thread::spawn(move || service.decrease(UnitOfWorkStrategy::CommitJoined, LOCK_NAME, STOCK, 1))
    };
    thread::sleep(Duration::from_millis(30));
    assert_eq!(service.body_invocations(), 0);

    drop(held);
    let result = waiter.join().unwrap().unwrap();
    assert!(result.is_acquired());
    assert_eq!(service.quantity_of(STOCK).unwrap(), 9);
}

#[test]
fn timeouts_under_load_leave_counter_consistent() {
    // Each body holds the lock for at least the commit latency, so with a
    // wait shorter than the queue some callers give up
    let service = seeded_service(INITIAL_QUANTITY, Duration::from_millis(5));
    let op = ProtectedOperation::new("impatient", "#lockName")
        .params(["lockName", "id", "quantity"])
        .wait(Duration::from_millis(20))
        .strategy(UnitOfWorkStrategy::CommitJoined);
    service.register(op).unwrap();

    let tally = run_callers(|_| service.call("impatient", &CallOptions::default(), LOCK_NAME, STOCK, 1));

    assert_eq!(tally.failed(), 0);
    assert!(tally.not_acquired() > 0);
    assert_eq!(tally.acquired() + tally.not_acquired(), CALLERS);
    assert_eq!(service.body_invocations(), tally.acquired());
    assert_eq!(
        service.quantity_of(STOCK).unwrap(),
        INITIAL_QUANTITY - tally.acquired()
    );
}

#[test]
fn interrupt_while_waiting_propagates() {
    let service = seeded_service(10, Duration::ZERO);
    let _held = hold_lock(&service);
    let interrupt = Interrupt::new();

    let waiter = {
        let service = std::sync::Arc::clone(&service);
        let options = CallOptions::default().with_interrupt(interrupt.clone());
        thread::spawn(move || {
            service.decrease_within(&options, UnitOfWorkStrategy::ForcedNested, LOCK_NAME, STOCK, 1)
        })
    };
    thread::sleep(Duration::from_millis(30));
    interrupt.interrupt();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(err, StrataError::LockInterrupted { .. }));
    assert_eq!(service.body_invocations(), 0);
    assert_eq!(service.lock_metrics().interrupted, 1);
    assert_eq!(service.quantity_of(STOCK).unwrap(), 10);
}

#[test]
fn interrupt_rolls_back_ambient_work_of_the_call() {
    let service = seeded_service(10, Duration::ZERO);
    let _held = hold_lock(&service);
    let interrupt = Interrupt::new();
    interrupt.interrupt();

    let before = service.transaction_metrics();
    let err = service
        .decrease_within(
            &CallOptions::default().with_interrupt(interrupt),
            UnitOfWorkStrategy::Embedded,
            LOCK_NAME,
            STOCK,
            1,
        )
        .unwrap_err();
    assert!(matches!(err, StrataError::LockInterrupted { .. }));

    // The transaction interceptor began a unit of work and rolled it back
    let after = service.transaction_metrics();
    assert_eq!(after.started, before.started + 1);
    assert_eq!(after.aborted, before.aborted + 1);
}
