//! Batching scheduler

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use actcoord::{SchedulerSurface, UpdateHook};
use tracing::{debug, trace};

use super::cell::StateCell;
use super::queue::{CellId, CommitRecord, EffectRecord, QueuedUpdate, SchedulerStats};
use crate::interaction::Interactions;

type EffectBody = Box<dyn Fn() -> eyre::Result<()>>;
type Renderer = Rc<dyn Fn(&CommitRecord)>;

struct Effect {
    name: String,
    deps: Vec<CellId>,
    body: EffectBody,
}

pub(crate) struct SchedulerInner {
    interactions: Interactions,
    queued: RefCell<Vec<QueuedUpdate>>,
    names: RefCell<HashMap<CellId, Rc<str>>>,
    effects: RefCell<Vec<Rc<Effect>>>,
    pending_effects: RefCell<Vec<(Rc<Effect>, u64)>>,
    renderers: RefCell<Vec<Renderer>>,
    commits: RefCell<Vec<CommitRecord>>,
    effect_runs: RefCell<Vec<EffectRecord>>,
    hook: RefCell<Option<UpdateHook>>,
    next_cell: Cell<u64>,
    stats: RefCell<SchedulerStats>,
}

impl SchedulerInner {
    pub(crate) fn enqueue(&self, cell: CellId, name: &str, apply: Box<dyn FnOnce()>) {
        let depth = {
            let mut queued = self.queued.borrow_mut();
            queued.push(QueuedUpdate { cell, apply });
            queued.len()
        };
        {
            let mut stats = self.stats.borrow_mut();
            stats.total_updates += 1;
            stats.peak_batch = stats.peak_batch.max(depth);
        }

        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(name);
        }
    }

    fn render(&self) -> eyre::Result<()> {
        let updates = std::mem::take(&mut *self.queued.borrow_mut());
        if updates.is_empty() {
            return Ok(());
        }

        let count = updates.len();
        let mut changed = BTreeSet::new();
        for update in updates {
            (update.apply)();
            changed.insert(update.cell);
        }

        let commit = {
            let mut stats = self.stats.borrow_mut();
            stats.total_commits += 1;
            stats.total_commits
        };
        let cells = {
            let names = self.names.borrow();
            let mut cells: Vec<String> = changed.iter().filter_map(|id| names.get(id)).map(|n| n.to_string()).collect();
            cells.sort();
            cells
        };
        let record = CommitRecord {
            commit,
            updates: count,
            cells,
            interactions: self.interactions.current(),
        };
        debug!(commit, updates = count, "BatchScheduler::render: committed");
        self.commits.borrow_mut().push(record.clone());

        let renderers = self.renderers.borrow().clone();
        for renderer in renderers {
            renderer(&record);
        }

        let effects = self.effects.borrow();
        let mut pending = self.pending_effects.borrow_mut();
        for effect in effects.iter() {
            let triggered = effect.deps.is_empty() || effect.deps.iter().any(|d| changed.contains(d));
            if triggered && !pending.iter().any(|(e, _)| Rc::ptr_eq(e, effect)) {
                trace!(effect = %effect.name, commit, "BatchScheduler::render: scheduling effect");
                pending.push((effect.clone(), commit));
            }
        }
        Ok(())
    }

    fn run_effects(&self) -> eyre::Result<()> {
        let batch = std::mem::take(&mut *self.pending_effects.borrow_mut());
        debug!(effects = batch.len(), "BatchScheduler::run_effects: called");

        for (effect, commit) in batch {
            self.effect_runs.borrow_mut().push(EffectRecord {
                effect: effect.name.clone(),
                commit,
                interactions: self.interactions.current(),
            });
            self.stats.borrow_mut().total_effect_runs += 1;

            if let Err(err) = (effect.body)() {
                debug!(effect = %effect.name, %err, "BatchScheduler::run_effects: effect failed");
                self.stats.borrow_mut().total_effect_failures += 1;
                return Err(err);
            }
        }
        Ok(())
    }
}

/// A scheduler that batches state updates into commits
///
/// Updates queue until a render pass applies them all as one commit.
/// Effects whose dependencies changed in a commit run in the following
/// effect pass; they may queue more updates. Nothing happens until
/// something flushes, normally an act scope.
///
/// `BatchScheduler` is a cheap handle; clones share one scheduler.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Rc<SchedulerInner>,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(Interactions::default())
    }
}

impl BatchScheduler {
    pub fn new(interactions: Interactions) -> Self {
        debug!("BatchScheduler::new: called");
        Self {
            inner: Rc::new(SchedulerInner {
                interactions,
                queued: RefCell::new(Vec::new()),
                names: RefCell::new(HashMap::new()),
                effects: RefCell::new(Vec::new()),
                pending_effects: RefCell::new(Vec::new()),
                renderers: RefCell::new(Vec::new()),
                commits: RefCell::new(Vec::new()),
                effect_runs: RefCell::new(Vec::new()),
                hook: RefCell::new(None),
                next_cell: Cell::new(0),
                stats: RefCell::new(SchedulerStats::default()),
            }),
        }
    }

    pub fn interactions(&self) -> &Interactions {
        &self.inner.interactions
    }

    /// Create a state cell named `name`
    pub fn cell<T: Clone + 'static>(&self, name: &str, initial: T) -> StateCell<T> {
        let id = CellId(self.inner.next_cell.get());
        self.inner.next_cell.set(id.0 + 1);
        debug!(cell = name, id = id.0, "BatchScheduler::cell: called");
        self.inner.names.borrow_mut().insert(id, Rc::from(name));
        StateCell::new(id, name, initial, Rc::downgrade(&self.inner))
    }

    /// Register an effect that runs after every commit changing one of
    /// `deps` (every commit when `deps` is empty)
    pub fn effect<I, F>(&self, name: &str, deps: I, body: F)
    where
        I: IntoIterator<Item = CellId>,
        F: Fn() -> eyre::Result<()> + 'static,
    {
        let deps: Vec<CellId> = deps.into_iter().collect();
        debug!(effect = name, ?deps, "BatchScheduler::effect: called");
        self.inner.effects.borrow_mut().push(Rc::new(Effect {
            name: name.to_string(),
            deps,
            body: Box::new(body),
        }));
    }

    /// Observe every commit as it happens
    pub fn on_render(&self, renderer: impl Fn(&CommitRecord) + 'static) {
        self.inner.renderers.borrow_mut().push(Rc::new(renderer));
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.inner.commits.borrow().clone()
    }

    pub fn effect_runs(&self) -> Vec<EffectRecord> {
        self.inner.effect_runs.borrow().clone()
    }

    /// Names of the effects run so far, in order
    pub fn effect_log(&self) -> Vec<String> {
        self.inner.effect_runs.borrow().iter().map(|r| r.effect.clone()).collect()
    }

    pub fn pending_updates(&self) -> usize {
        self.inner.queued.borrow().len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.borrow().clone()
    }

    /// Nothing queued and no effects pending
    pub fn is_settled(&self) -> bool {
        !self.has_pending_sync_work() && !self.has_pending_effects()
    }
}

impl SchedulerSurface for BatchScheduler {
    fn has_pending_sync_work(&self) -> bool {
        !self.inner.queued.borrow().is_empty()
    }

    fn flush_sync_work(&self) -> eyre::Result<()> {
        self.inner.render()
    }

    fn has_pending_effects(&self) -> bool {
        !self.inner.pending_effects.borrow().is_empty()
    }

    fn flush_effects(&self) -> eyre::Result<()> {
        self.inner.run_effects()
    }

    fn on_update_outside_scope(&self, hook: UpdateHook) {
        debug!("BatchScheduler::on_update_outside_scope: called");
        *self.inner.hook.borrow_mut() = Some(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_batch_into_one_commit() {
        let scheduler = BatchScheduler::default();
        let count = scheduler.cell("count", 0);
        count.set(1);
        count.update(|c| c + 1);
        count.update(|c| c + 1);

        assert_eq!(count.get(), 0);
        assert_eq!(scheduler.pending_updates(), 3);

        scheduler.flush_sync_work().unwrap();
        assert_eq!(count.get(), 3);
        let commits = scheduler.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].updates, 3);
        assert_eq!(commits[0].cells, vec!["count"]);
    }

    #[test]
    fn test_render_with_nothing_queued_is_noop() {
        let scheduler = BatchScheduler::default();
        scheduler.flush_sync_work().unwrap();
        assert!(scheduler.commits().is_empty());
        assert!(scheduler.is_settled());
    }

    #[test]
    fn test_effect_scheduled_by_dependency() {
        let scheduler = BatchScheduler::default();
        let a = scheduler.cell("a", 0);
        let b = scheduler.cell("b", 0);
        scheduler.effect("on_a", [a.id()], || Ok(()));
        scheduler.effect("on_b", [b.id()], || Ok(()));

        a.set(1);
        scheduler.flush_sync_work().unwrap();
        assert!(scheduler.has_pending_effects());
        scheduler.flush_effects().unwrap();

        assert_eq!(scheduler.effect_log(), vec!["on_a"]);
        assert!(scheduler.is_settled());
    }

    #[test]
    fn test_effect_without_deps_runs_every_commit() {
        let scheduler = BatchScheduler::default();
        let a = scheduler.cell("a", 0);
        scheduler.effect("always", [], || Ok(()));

        for n in 1..=2 {
            a.set(n);
            scheduler.flush_sync_work().unwrap();
            scheduler.flush_effects().unwrap();
        }
        assert_eq!(scheduler.effect_log(), vec!["always", "always"]);
    }

    #[test]
    fn test_effect_updates_queue_next_render() {
        let scheduler = BatchScheduler::default();
        let a = scheduler.cell("a", 0);
        let doubled = scheduler.cell("doubled", 0);
        let (src, dst) = (a.clone(), doubled.clone());
        scheduler.effect("double", [a.id()], move || {
            dst.set(src.get() * 2);
            Ok(())
        });

        a.set(4);
        scheduler.flush_sync_work().unwrap();
        scheduler.flush_effects().unwrap();
        assert!(scheduler.has_pending_sync_work());

        scheduler.flush_sync_work().unwrap();
        assert_eq!(doubled.get(), 8);
        assert_eq!(scheduler.commits().len(), 2);
    }

    #[test]
    fn test_effect_error_propagates() {
        let scheduler = BatchScheduler::default();
        let a = scheduler.cell("a", 0);
        scheduler.effect("boom", [a.id()], || eyre::bail!("effect exploded"));

        a.set(1);
        scheduler.flush_sync_work().unwrap();
        let err = scheduler.flush_effects().unwrap_err();

        assert_eq!(err.to_string(), "effect exploded");
        assert_eq!(scheduler.stats().total_effect_failures, 1);
    }

    #[test]
    fn test_hook_called_for_every_update() {
        let scheduler = BatchScheduler::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        scheduler.on_update_outside_scope(Rc::new(move |source: &str| s.borrow_mut().push(source.to_string())));

        let count = scheduler.cell("count", 0);
        count.set(1);
        count.set(2);
        assert_eq!(*seen.borrow(), vec!["count", "count"]);
    }

    #[test]
    fn test_commit_records_interactions() {
        let scheduler = BatchScheduler::default();
        let count = scheduler.cell("count", 0);
        count.set(1);

        scheduler.interactions().track("click", || scheduler.flush_sync_work()).unwrap();

        assert_eq!(scheduler.commits()[0].interaction_names(), vec!["click"]);
    }

    #[test]
    fn test_on_render_sees_committed_values() {
        let scheduler = BatchScheduler::default();
        let count = scheduler.cell("count", 0);
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let (r, c) = (rendered.clone(), count.clone());
        scheduler.on_render(move |record| r.borrow_mut().push((record.commit, c.get())));

        count.set(7);
        scheduler.flush_sync_work().unwrap();
        assert_eq!(*rendered.borrow(), vec![(1, 7)]);
    }

    #[test]
    fn test_stats_track_peak_batch() {
        let scheduler = BatchScheduler::default();
        let count = scheduler.cell("count", 0);
        for n in 0..5 {
            count.set(n);
        }
        scheduler.flush_sync_work().unwrap();
        let stats = scheduler.stats();
        assert_eq!(stats.total_updates, 5);
        assert_eq!(stats.peak_batch, 5);
        assert_eq!(stats.total_commits, 1);
    }
}
