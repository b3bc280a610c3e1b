//! Strategy Tests
//!
//! 100 concurrent decrement-by-one calls on a stock of 100, 32 workers.
//! Every strategy that commits before releasing must end at exactly 0;
//! Embedded must be seen to lose updates.

use crate::common::*;
use std::time::Duration;
use stratalock::{InterceptorChain, LockScope, StockService};

/// Repeat the Embedded scenario until a lost update shows up
fn observe_embedded_race(run: impl Fn() -> u64) -> Vec<u64> {
    let mut finals = Vec::new();
    for _ in 0..RACE_TRIALS {
        let remaining = run();
        finals.push(remaining);
        if remaining != 0 {
            break;
        }
    }
    finals
}

#[test]
fn embedded_loses_updates() {
    let finals = observe_embedded_race(|| {
        let service = scenario_service();
        let tally = decrement_concurrently(&service, UnitOfWorkStrategy::Embedded);
        assert_eq!(tally.acquired(), CALLERS);
        service.quantity_of(STOCK).unwrap()
    });

    assert!(
        finals.iter().any(|&q| q != 0),
        "no lost update in {} trials: {:?}",
        finals.len(),
        finals
    );
}

#[test]
fn forced_nested_is_exact() {
    for _ in 0..3 {
        let service = scenario_service();
        let tally = decrement_concurrently(&service, UnitOfWorkStrategy::ForcedNested);
        assert_eq!(tally.acquired(), CALLERS);
        assert_eq!(tally.failed(), 0);
        assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
    }
}

#[test]
fn priority_reordered_is_exact() {
    for _ in 0..3 {
        let service = scenario_service();
        let tally = decrement_concurrently(&service, UnitOfWorkStrategy::PriorityReordered);
        assert_eq!(tally.acquired(), CALLERS);
        assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
    }
}

#[test]
fn commit_joined_is_exact() {
    for _ in 0..3 {
        let service = scenario_service();
        let tally = decrement_concurrently(&service, UnitOfWorkStrategy::CommitJoined);
        assert_eq!(tally.acquired(), CALLERS);
        assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
        assert_eq!(service.lock_metrics().released, CALLERS);
    }
}

/// Run the scenario through `chain` instead of the strategy's own chain
fn decrement_through(service: &StockService, chain: &InterceptorChain) -> u64 {
    let operation =
        ProtectedOperation::new("reordered_decrease", "#lockName").params(["lockName", "id", "quantity"]);
    let args = decrease_args(LOCK_NAME, 1);

    let tally = run_callers(|_| {
        service.controller().execute_with_chain(
            chain,
            &operation,
            &args,
            &Interrupt::new(),
            None,
            |uow| decrement(uow, 1),
        )
    });
    assert_eq!(tally.acquired(), CALLERS);
    service.quantity_of(STOCK).unwrap()
}

#[test]
fn priority_reordered_depends_on_interceptor_order() {
    // Lock ordered outside the transaction: exact
    let service = scenario_service();
    let lock_first = InterceptorChain::new(vec![
        service.controller().transaction_interceptor(0),
        service.controller().lock_interceptor(LockScope::Ambient, -1),
    ]);
    assert_eq!(decrement_through(&service, &lock_first), 0);

    // Same interceptors, lock order raised to the transaction's: the tie is
    // broken by registration order, the transaction ends up outside and the
    // race is back
    let finals = observe_embedded_race(|| {
        let service = scenario_service();
        let tied = InterceptorChain::new(vec![
            service.controller().transaction_interceptor(0),
            service.controller().lock_interceptor(LockScope::Ambient, 0),
        ]);
        assert_eq!(tied.names(), vec!["transaction", "lock"]);
        decrement_through(&service, &tied)
    });
    assert!(finals.iter().any(|&q| q != 0), "{:?}", finals);
}

#[test]
fn commit_joined_does_not_depend_on_interceptor_order() {
    for lock_order in [-1, 0, 1] {
        let service = scenario_service();
        let chain = InterceptorChain::new(vec![
            service.controller().transaction_interceptor(0),
            service
                .controller()
                .lock_interceptor(LockScope::CommitJoined, lock_order),
        ]);
        assert_eq!(decrement_through(&service, &chain), 0, "lock order {}", lock_order);
    }
}

#[test]
fn commit_joined_with_caller_units_of_work_is_exact() {
    let service = scenario_service();
    let tally = run_callers(|_| {
        let ambient = service.manager().begin();
        let options = CallOptions::default().with_ambient(ambient.clone());
        let result = service.decrease_within(
            &options,
            UnitOfWorkStrategy::CommitJoined,
            LOCK_NAME,
            STOCK,
            1,
        )?;
        // The lock stays held until this commit
        assert_eq!(ambient.bound_lock_count(), 1);
        service.manager().commit(&ambient)?;
        Ok(result)
    });
    assert_eq!(tally.acquired(), CALLERS);
    assert_eq!(service.quantity_of(STOCK).unwrap(), 0);
}

#[test]
fn forced_nested_commits_despite_ambient_rollback() {
    let service = seeded_service(10, Duration::ZERO);
    let ambient = service.manager().begin();
    let options = CallOptions::default().with_ambient(ambient.clone());

    service
        .decrease_within(&options, UnitOfWorkStrategy::ForcedNested, LOCK_NAME, STOCK, 3)
        .unwrap();
    service.manager().rollback(&ambient, "outer failure").unwrap();

    assert_eq!(service.quantity_of(STOCK).unwrap(), 7);
}

#[test]
fn ambient_strategies_roll_back_with_caller() {
    for strategy in [
        UnitOfWorkStrategy::Embedded,
        UnitOfWorkStrategy::PriorityReordered,
        UnitOfWorkStrategy::CommitJoined,
    ] {
        let service = seeded_service(10, Duration::ZERO);
        let ambient = service.manager().begin();
        let options = CallOptions::default().with_ambient(ambient.clone());

        service
            .decrease_within(&options, strategy, LOCK_NAME, STOCK, 3)
            .unwrap();
        service.manager().rollback(&ambient, "outer failure").unwrap();

        assert_eq!(service.quantity_of(STOCK).unwrap(), 10, "{}", strategy);
        let relock = service
            .coordinator()
            .acquire(
                &LockKey::new(LOCK_NAME),
                Duration::ZERO,
                Duration::from_secs(1),
                &Interrupt::new(),
            )
            .unwrap();
        assert!(relock.is_granted(), "{} left its lock held", strategy);
    }
}
