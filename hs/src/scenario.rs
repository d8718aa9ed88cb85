//! Built-in scenarios
//!
//! Each scenario drives a fresh [`Harness`] and checks one coordinator
//! guarantee end to end on the deterministic host.

use std::cell::RefCell;
use std::rc::Rc;

use actcoord::{ActConfig, ActError, Diagnostic, DiagnosticKind};
use eyre::{Result, ensure};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::harness::Harness;

/// A named, self-checking run against a fresh harness
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    run: fn(&Harness) -> Result<String>,
}

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    /// Summary on success, the failed check on failure
    pub detail: String,
    pub diagnostics: Vec<Diagnostic>,
    pub turns: u64,
    pub commits: usize,
}

/// Error the rejection scenario raises from its callback
#[derive(Debug, Error)]
#[error("submit rejected: {0}")]
pub struct Rejected(pub String);

/// All built-in scenarios, in run order
pub fn all() -> &'static [Scenario] {
    SCENARIOS
}

pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

/// Run `scenario` on a fresh harness built from `config`
pub fn run(scenario: &Scenario, config: &ActConfig) -> ScenarioReport {
    debug!(scenario = scenario.name, "scenario::run: called");
    let harness = Harness::new(config.clone());
    let (passed, detail) = match (scenario.run)(&harness) {
        Ok(detail) => (true, detail),
        Err(err) => (false, format!("{err:#}")),
    };
    info!(scenario = scenario.name, passed, "Scenario finished");

    ScenarioReport {
        name: scenario.name.to_string(),
        passed,
        detail,
        diagnostics: harness.recorder.diagnostics(),
        turns: harness.host.turns(),
        commits: harness.scheduler.commits().len(),
    }
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "batching",
        description: "three updates in one sync scope commit once; the effect sees the final value",
        run: batching,
    },
    Scenario {
        name: "fixed-point",
        description: "effects that queue more updates are flushed until nothing is pending",
        run: fixed_point,
    },
    Scenario {
        name: "async-chain",
        description: "five continuation-triggered updates land before the async scope settles",
        run: async_chain,
    },
    Scenario {
        name: "timer-chain",
        description: "five zero-delay timer updates land before the async scope settles",
        run: timer_chain,
    },
    Scenario {
        name: "invalid-return",
        description: "bare return values are reported once each",
        run: invalid_return,
    },
    Scenario {
        name: "awaited-sync",
        description: "awaiting a sync scope is reported once",
        run: awaited_sync,
    },
    Scenario {
        name: "overlapping",
        description: "a second async scope during a drain is reported once; both settle",
        run: overlapping,
    },
    Scenario {
        name: "not-awaited",
        description: "a dropped async scope still drains and is reported once",
        run: not_awaited,
    },
    Scenario {
        name: "unwrapped-update",
        description: "an update outside every scope is reported naming its source",
        run: unwrapped_update,
    },
    Scenario {
        name: "async-error",
        description: "an async callback's error comes back unwrapped",
        run: async_error,
    },
    Scenario {
        name: "interactions",
        description: "the interaction current at entry covers every commit of the scope",
        run: interactions,
    },
];

fn batching(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (s, c) = (seen.clone(), count.clone());
    h.scheduler.effect("observe", [count.id()], move || {
        s.borrow_mut().push(c.get());
        Ok(())
    });

    h.coordinator
        .act(|| {
            count.update(|c| c + 1);
            count.update(|c| c + 1);
            count.update(|c| c + 1);
        })
        .into_result()?;

    ensure!(*seen.borrow() == vec![3], "effect observed {:?}, expected [3]", seen.borrow());
    ensure!(h.scheduler.commits().len() == 1, "expected one commit");
    Ok("3 updates, 1 commit, effect saw 3".to_string())
}

fn fixed_point(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let c = count.clone();
    h.scheduler.effect("step", [count.id()], move || {
        if c.get() < 5 {
            c.update(|v| v + 1);
        }
        Ok(())
    });

    h.coordinator.act(|| count.set(1)).into_result()?;

    ensure!(count.get() == 5, "count is {}, expected 5", count.get());
    ensure!(h.scheduler.is_settled(), "scheduler still has pending work");
    Ok(format!("settled at 5 after {} commits", h.scheduler.commits().len()))
}

fn async_chain(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let (host, c) = (h.host.clone(), count.clone());
    h.scheduler.effect("step", [count.id()], move || {
        if c.get() < 5 {
            let (host, c) = (host.clone(), c.clone());
            host.clone().spawn(async move {
                host.yield_now().await;
                c.update(|v| v + 1);
            });
        }
        Ok(())
    });

    let (host, c) = (h.host.clone(), count.clone());
    let act = h.coordinator.act_async(move || async move {
        host.yield_now().await;
        c.update(|v| v + 1);
    });
    h.host.block_on(act)??;

    ensure!(count.get() == 5, "count is {}, expected 5", count.get());
    ensure!(h.scheduler.commits().len() == 5, "expected 5 commits");
    ensure!(h.coordinator.state().is_idle(), "coordinator state not idle");
    Ok(format!("count reached 5 over {} turns", h.host.turns()))
}

fn timer_chain(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let (host, c) = (h.host.clone(), count.clone());
    h.scheduler.effect("step", [count.id()], move || {
        if c.get() < 5 {
            let c = c.clone();
            host.set_timeout(0, move || c.update(|v| v + 1));
        }
        Ok(())
    });

    let (host, c) = (h.host.clone(), count.clone());
    let act = h.coordinator.act_async(move || async move {
        host.sleep(0).await;
        c.update(|v| v + 1);
    });
    h.host.block_on(act)??;

    ensure!(count.get() == 5, "count is {}, expected 5", count.get());
    Ok(format!("count reached 5 over {} turns", h.host.turns()))
}

fn invalid_return(h: &Harness) -> Result<String> {
    h.coordinator.act(|| None::<i32>).into_result()?;
    h.coordinator.act(|| 42).into_result()?;

    ensure!(h.warnings(DiagnosticKind::InvalidReturn) == 2, "expected two reports");
    let messages = h.recorder.messages();
    ensure!(messages[0].ends_with("It returned None."), "unexpected message: {}", messages[0]);
    ensure!(messages[1].ends_with("It returned 42."), "unexpected message: {}", messages[1]);
    Ok("None and 42 reported".to_string())
}

fn awaited_sync(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let c = count.clone();
    let act = h.coordinator.act(move || c.set(1));
    h.host.block_on(async move { act.await })??;

    ensure!(h.warnings(DiagnosticKind::AwaitedSyncScope) == 1, "expected one report");
    ensure!(count.get() == 1, "sync scope did not flush");
    Ok("awaiting a sync scope reported once".to_string())
}

fn overlapping(h: &Harness) -> Result<String> {
    let a = h.scheduler.cell("a", 0);
    let b = h.scheduler.cell("b", 0);

    let ca = a.clone();
    let first = h.coordinator.act_async(move || async move {
        ca.update(|v| v + 1);
    });
    h.host.run_microtasks()?;
    ensure!(h.coordinator.state().async_drain_in_flight, "first scope should be draining");

    let (host, cb) = (h.host.clone(), b.clone());
    let second = h.coordinator.act_async(move || async move {
        host.sleep(10).await;
        cb.update(|v| v + 1);
    });

    h.host.block_on(async move {
        let (first, second) = futures::join!(first, second);
        first.and(second)
    })??;
    h.host.run_until_idle()?;

    ensure!(h.warnings(DiagnosticKind::OverlappingScopes) == 1, "expected one report");
    ensure!(a.get() == 1 && b.get() == 1, "both scopes must apply their update");
    ensure!(h.coordinator.state().is_idle(), "coordinator state not idle");
    Ok("overlap reported once, both settled".to_string())
}

fn not_awaited(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let c = count.clone();
    drop(h.coordinator.act_async(move || async move {
        c.set(1);
    }));
    h.host.run_until_idle()?;

    ensure!(h.warnings(DiagnosticKind::NotAwaited) == 1, "expected one report");
    ensure!(count.get() == 1, "dropped scope did not drain");
    Ok("dropped scope drained and reported once".to_string())
}

fn unwrapped_update(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    count.set(1);

    ensure!(h.warnings(DiagnosticKind::UpdateNotWrapped) == 1, "expected one report");
    let diagnostics = h.recorder.diagnostics();
    ensure!(
        matches!(&diagnostics[0], Diagnostic::UpdateNotWrapped { source } if source == "count"),
        "report does not name the cell"
    );

    h.coordinator.act(|| {}).into_result()?;
    ensure!(count.get() == 1, "queued update was not applied by the next scope");
    Ok("update to count reported".to_string())
}

fn async_error(h: &Harness) -> Result<String> {
    let host = h.host.clone();
    let act = h.coordinator.act_async(move || async move {
        host.yield_now().await;
        Err::<(), _>(Rejected("quota exceeded".to_string()))
    });

    let err = match h.host.block_on(act)? {
        Ok(()) => eyre::bail!("scope resolved; expected a rejection"),
        Err(err) => err,
    };
    ensure!(matches!(err, ActError::Callback(_)), "expected a callback error, got {err:?}");
    let rejected = err.report().and_then(|r| r.downcast_ref::<Rejected>());
    ensure!(rejected.is_some(), "error was wrapped: {err}");
    ensure!(err.to_string() == "submit rejected: quota exceeded", "message changed: {err}");
    ensure!(h.coordinator.state().is_idle(), "coordinator state not idle");
    Ok("rejected with the callback's own error".to_string())
}

fn interactions(h: &Harness) -> Result<String> {
    let count = h.scheduler.cell("count", 0);
    let (host, c) = (h.host.clone(), count.clone());
    h.scheduler.effect("step", [count.id()], move || {
        if c.get() < 2 {
            let (host, c) = (host.clone(), c.clone());
            host.clone().spawn(async move {
                host.yield_now().await;
                c.update(|v| v + 1);
            });
        }
        Ok(())
    });

    let (host, c) = (h.host.clone(), count.clone());
    let act = h.interactions.track("click", || {
        h.coordinator.act_async(move || async move {
            host.yield_now().await;
            c.update(|v| v + 1);
        })
    });
    h.host.block_on(act)??;

    let commits = h.scheduler.commits();
    ensure!(commits.len() == 2, "expected 2 commits, got {}", commits.len());
    for commit in &commits {
        ensure!(
            commit.interaction_names() == vec!["click"],
            "commit {} saw {:?}",
            commit.commit,
            commit.interaction_names()
        );
    }
    for run in h.scheduler.effect_runs() {
        ensure!(run.interaction_names() == vec!["click"], "effect run saw {:?}", run.interaction_names());
    }
    ensure!(h.interactions.current().is_empty(), "interaction leaked past the scope");
    Ok(format!("click covered {} commits across turns", commits.len()))
}
