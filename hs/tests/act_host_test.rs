//! Integration tests for the coordinator on the reference host
//!
//! These tests drive the act coordinator against the deterministic host
//! and the batching scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use actcoord::{ActConfig, ActError, Coordinator, DiagnosticKind, Recorder, SchedulerSurface, TokioHost};
use hostsched::scenario;
use hostsched::{BatchScheduler, Harness, HostError, StateCell};
use proptest::prelude::*;

fn stepper(h: &Harness, count: &StateCell<i32>, limit: i32) {
    let (host, c) = (h.host.clone(), count.clone());
    h.scheduler.effect("step", [count.id()], move || {
        if c.get() < limit {
            let (host, c) = (host.clone(), c.clone());
            host.clone().spawn(async move {
                host.yield_now().await;
                c.update(|v| v + 1);
            });
        }
        Ok(())
    });
}

// =============================================================================
// Built-in Scenarios
// =============================================================================

#[test]
fn test_builtin_scenarios_pass() {
    let config = ActConfig::default();
    for s in scenario::all() {
        let report = scenario::run(s, &config);
        assert!(report.passed, "{}: {}", report.name, report.detail);
    }
}

#[test]
fn test_scenario_report_json() {
    let report = scenario::run(scenario::find("overlapping").unwrap(), &ActConfig::default());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["name"], "overlapping");
    assert_eq!(json["passed"], true);
    assert_eq!(json["diagnostics"][0]["kind"], "overlapping_scopes");
}

// =============================================================================
// Async Drain Tests
// =============================================================================

#[test]
fn test_async_chain_reaches_five() {
    let h = Harness::default();
    let count = h.scheduler.cell("count", 0);
    stepper(&h, &count, 5);

    let c = count.clone();
    let act = h.coordinator.act_async(move || async move {
        c.update(|v| v + 1);
    });
    h.host.block_on(act).unwrap().unwrap();

    assert_eq!(count.get(), 5);
    assert!(h.scheduler.is_settled());
    assert!(h.coordinator.state().is_idle());
    assert!(h.recorder.is_empty());
}

#[test]
fn test_delayed_timer_not_drained() {
    let h = Harness::default();
    let count = h.scheduler.cell("count", 0);
    let (host, c) = (h.host.clone(), count.clone());
    h.scheduler.effect("later", [count.id()], move || {
        if c.get() == 1 {
            let c = c.clone();
            host.set_timeout(100, move || c.set(2));
        }
        Ok(())
    });

    let c = count.clone();
    let act = h.coordinator.act_async(move || async move { c.set(1) });
    h.host.block_on(act).unwrap().unwrap();
    assert_eq!(count.get(), 1);

    // The timer fires after the scope settled
    h.host.run_until_idle().unwrap();
    assert_eq!(h.host.now(), 100);
    assert_eq!(h.recorder.count(DiagnosticKind::UpdateNotWrapped), 1);
    assert_eq!(h.scheduler.pending_updates(), 1);
}

#[test]
fn test_async_flush_error_keeps_identity() {
    let h = Harness::default();
    let count = h.scheduler.cell("count", 0);
    h.scheduler.effect("fail", [count.id()], || Err(eyre::eyre!("effect exploded")));

    let c = count.clone();
    let act = h.coordinator.act_async(move || async move { c.set(1) });
    let err = h.host.block_on(act).unwrap().unwrap_err();

    assert!(err.is_flush());
    assert_eq!(err.to_string(), "effect exploded");
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_overlapping_depth_returns_to_zero() {
    let h = Harness::default();
    let a = h.scheduler.cell("a", 0);
    let b = h.scheduler.cell("b", 0);

    let ca = a.clone();
    let first = h.coordinator.act_async(move || async move { ca.set(1) });
    // the first callback settles and its drain waits for the next turn
    h.host.run_microtasks().unwrap();
    assert!(h.coordinator.state().async_drain_in_flight);

    let (host, cb) = (h.host.clone(), b.clone());
    let second = h.coordinator.act_async(move || async move {
        host.sleep(5).await;
        cb.set(1);
    });

    // Each open async scope holds its depth until its drain settles
    let during = h.coordinator.state();
    assert_eq!(during.depth, 2);
    assert_eq!(during.outstanding_async, 2);

    h.host
        .block_on(async move {
            let (first, second) = futures::join!(first, second);
            first.and(second)
        })
        .unwrap()
        .unwrap();
    h.host.run_until_idle().unwrap();

    assert_eq!((a.get(), b.get()), (1, 1));
    assert_eq!(h.recorder.count(DiagnosticKind::OverlappingScopes), 1);
    assert_eq!(h.recorder.count(DiagnosticKind::NotAwaited), 0);
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_three_overlapping_scopes_warn_once() {
    let h = Harness::default();
    let count = h.scheduler.cell("count", 0);

    let c = count.clone();
    let first = h.coordinator.act_async(move || async move { c.update(|v| v + 1) });
    h.host.run_microtasks().unwrap();

    let (c1, c2) = (count.clone(), count.clone());
    let second = h.coordinator.act_async(move || async move { c1.update(|v| v + 1) });
    let third = h.coordinator.act_async(move || async move { c2.update(|v| v + 1) });

    h.host
        .block_on(async move {
            let (first, second, third) = futures::join!(first, second, third);
            first.and(second).and(third)
        })
        .unwrap()
        .unwrap();
    h.host.run_until_idle().unwrap();

    assert_eq!(count.get(), 3);
    assert_eq!(h.recorder.count(DiagnosticKind::OverlappingScopes), 1);
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_nested_awaited_async_scope_is_not_overlap() {
    let h = Harness::default();
    let count = h.scheduler.cell("count", 0);

    let (host, coordinator, c) = (h.host.clone(), h.coordinator.clone(), count.clone());
    let act = h.coordinator.act_async(move || async move {
        host.yield_now().await;
        let inner = c.clone();
        coordinator.act_async(move || async move { inner.update(|v| v + 1) }).await?;
        c.update(|v| v + 10);
        Ok::<(), ActError>(())
    });
    h.host.block_on(act).unwrap().unwrap();
    h.host.run_until_idle().unwrap();

    assert_eq!(count.get(), 11);
    assert!(h.recorder.is_empty(), "{:?}", h.recorder.diagnostics());
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_callback_sees_interaction_after_suspension() {
    let h = Harness::default();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (host, interactions, s) = (h.host.clone(), h.interactions.clone(), seen.clone());
    let act = h.interactions.track("submit", || {
        h.coordinator.act_async(move || async move {
            host.sleep(1).await;
            s.borrow_mut().extend(interactions.current_names());
        })
    });
    assert!(h.interactions.current().is_empty());

    h.host.block_on(act).unwrap().unwrap();
    assert_eq!(*seen.borrow(), vec!["submit"]);
}

#[test]
fn test_sync_flush_limit() {
    let h = Harness::new(ActConfig {
        max_flush_passes: 3,
        ..ActConfig::default()
    });
    let count = h.scheduler.cell("count", 0);
    let c = count.clone();
    h.scheduler.effect("forever", [count.id()], move || {
        c.update(|v| v + 1);
        Ok(())
    });

    let err = h.coordinator.act(|| count.set(1)).into_result().unwrap_err();
    assert!(matches!(err, ActError::FlushLimit { passes: 3 }));
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_flush_settling_at_pass_limit_is_ok() {
    let h = Harness::new(ActConfig {
        max_flush_passes: 1,
        ..ActConfig::default()
    });
    let count = h.scheduler.cell("count", 0);

    h.coordinator.act(|| count.set(1)).into_result().unwrap();

    assert_eq!(count.get(), 1);
    assert_eq!(h.scheduler.commits().len(), 1);
    assert!(h.coordinator.state().is_idle());
}

#[test]
fn test_block_on_stalls_on_orphaned_wait() {
    let h = Harness::default();
    let never = futures::future::pending::<()>();
    assert_eq!(h.host.block_on(never), Err(HostError::Stalled));
}

// =============================================================================
// Tokio Host Tests
// =============================================================================

#[tokio::test]
async fn test_tokio_host_drains_spawned_chain() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = BatchScheduler::default();
            let recorder = Recorder::new();
            let coordinator = Coordinator::builder(Rc::new(scheduler.clone()), Rc::new(TokioHost))
                .with_diagnostics(Rc::new(recorder.clone()))
                .build();

            let count = scheduler.cell("count", 0);
            let c = count.clone();
            scheduler.effect("step", [count.id()], move || {
                if c.get() < 5 {
                    let c = c.clone();
                    tokio::task::spawn_local(async move { c.update(|v| v + 1) });
                }
                Ok(())
            });

            let c = count.clone();
            coordinator
                .act_async(move || async move {
                    tokio::task::yield_now().await;
                    c.update(|v| v + 1);
                })
                .await
                .unwrap();

            assert_eq!(count.get(), 5);
            assert!(scheduler.is_settled());
            assert!(recorder.is_empty());
        })
        .await;
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_sync_scope_settles_in_one_commit(ops in prop::collection::vec((0usize..3, -5i32..5), 1..20)) {
        let h = Harness::default();
        let cells: Vec<_> = ["a", "b", "c"].iter().map(|name| h.scheduler.cell(name, 0)).collect();
        let observed = Rc::new(RefCell::new(0));
        let o = observed.clone();
        h.scheduler.effect("observe", cells.iter().map(|c| c.id()), move || {
            *o.borrow_mut() += 1;
            Ok(())
        });

        h.coordinator.act(|| {
            for (idx, delta) in &ops {
                let delta = *delta;
                cells[*idx].update(move |v| v + delta);
            }
        }).into_result().unwrap();

        for (idx, cell) in cells.iter().enumerate() {
            let expected: i32 = ops.iter().filter(|(i, _)| *i == idx).map(|(_, d)| d).sum();
            prop_assert_eq!(cell.get(), expected);
        }
        prop_assert!(!h.scheduler.has_pending_sync_work());
        prop_assert!(!h.scheduler.has_pending_effects());
        prop_assert_eq!(h.scheduler.commits().len(), 1);
        prop_assert_eq!(*observed.borrow(), 1);
        prop_assert!(h.recorder.is_empty());
    }

    #[test]
    fn prop_async_chain_of_any_length(limit in 1i32..12) {
        let h = Harness::default();
        let count = h.scheduler.cell("count", 0);
        stepper(&h, &count, limit);

        let c = count.clone();
        let act = h.coordinator.act_async(move || async move { c.set(1) });
        h.host.block_on(act).unwrap().unwrap();

        prop_assert_eq!(count.get(), limit);
        prop_assert!(h.coordinator.state().is_idle());
    }
}
