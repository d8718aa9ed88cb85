//! Deterministic single-threaded host loop

use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll};

use actcoord::{HostLoop, YieldTurn};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::SpawnError;
use thiserror::Error;
use tracing::{debug, trace};

use super::config::HostConfig;
use super::queue::{HostStats, Macrotask, ReadyQueue, Signal, TaskId, TaskWaker, TimerEntry};

/// Errors from driving the host
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Host stalled: the awaited future can never complete")]
    Stalled,

    #[error("Microtask limit reached ({limit} polls in one turn)")]
    MicrotaskLimit { limit: usize },

    #[error("Turn limit reached ({limit} turns)")]
    TurnLimit { limit: u64 },
}

struct HostInner {
    config: HostConfig,
    tasks: RefCell<HashMap<TaskId, LocalBoxFuture<'static, ()>>>,
    ready: ReadyQueue,
    macrotasks: RefCell<VecDeque<Macrotask>>,
    turn_waiters: RefCell<VecDeque<Rc<Signal>>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    next_task: Cell<u64>,
    next_timer: Cell<u64>,
    now: Cell<u64>,
    stats: RefCell<HostStats>,
}

/// A deterministic host with explicit microtask and macrotask queues
///
/// Woken tasks run as microtasks: all of them are drained after every turn.
/// A turn is one macrotask: a due timer, a queued callback, or a release of
/// the oldest `next_turn` waiter. Time is virtual and only moves when
/// nothing else is runnable.
///
/// `Host` is a cheap handle; clones share one loop.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        debug!(?config, "Host::new: called");
        Self {
            inner: Rc::new(HostInner {
                config,
                tasks: RefCell::new(HashMap::new()),
                ready: Arc::default(),
                macrotasks: RefCell::new(VecDeque::new()),
                turn_waiters: RefCell::new(VecDeque::new()),
                timers: RefCell::new(BinaryHeap::new()),
                next_task: Cell::new(0),
                next_timer: Cell::new(0),
                now: Cell::new(0),
                stats: RefCell::new(HostStats::default()),
            }),
        }
    }

    /// Virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.inner.now.get()
    }

    /// Turns run so far
    pub fn turns(&self) -> u64 {
        self.inner.stats.borrow().turns
    }

    pub fn stats(&self) -> HostStats {
        self.inner.stats.borrow().clone()
    }

    /// Tasks spawned and not yet complete
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Nothing runnable and nothing scheduled
    pub fn is_idle(&self) -> bool {
        self.ready_is_empty()
            && self.inner.macrotasks.borrow().is_empty()
            && self.inner.turn_waiters.borrow().is_empty()
            && self.inner.timers.borrow().is_empty()
    }

    /// Spawn a task; it first runs at the next microtask checkpoint
    pub fn spawn<F>(&self, fut: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = TaskId(self.inner.next_task.get());
        self.inner.next_task.set(id.0 + 1);
        trace!(task = id.0, "Host::spawn: called");
        self.inner.tasks.borrow_mut().insert(id, fut.boxed_local());
        self.inner.stats.borrow_mut().tasks_spawned += 1;
        self.push_ready(id);
        id
    }

    /// Queue `f` to run as its own turn
    pub fn queue_macrotask(&self, f: impl FnOnce() + 'static) {
        self.inner.macrotasks.borrow_mut().push_back(Macrotask::Callback(Box::new(f)));
    }

    /// Run `f` as a turn once virtual time reaches `now + delay_ms`
    pub fn set_timeout(&self, delay_ms: u64, f: impl FnOnce() + 'static) {
        debug!(delay_ms, "Host::set_timeout: called");
        self.inner.push_timer(delay_ms, Macrotask::Callback(Box::new(f)));
    }

    /// Continue at the next microtask checkpoint
    pub fn yield_now(&self) -> YieldTurn {
        YieldTurn::default()
    }

    /// Continue after `delay_ms` of virtual time, as a turn of its own
    pub fn sleep(&self, delay_ms: u64) -> Sleep {
        Sleep {
            host: Rc::downgrade(&self.inner),
            delay_ms,
            signal: None,
        }
    }

    /// Continue on a later turn, after work already queued
    pub fn next_turn(&self) -> NextTurn {
        NextTurn {
            host: Rc::downgrade(&self.inner),
            signal: None,
        }
    }

    /// Poll every woken task until none are left
    pub fn run_microtasks(&self) -> Result<usize, HostError> {
        let limit = self.inner.config.max_microtasks_per_turn;
        let mut polled = 0;
        while let Some(id) = self.pop_ready() {
            polled += 1;
            if polled > limit {
                debug!(limit, "Host::run_microtasks: limit reached");
                return Err(HostError::MicrotaskLimit { limit });
            }
            self.poll_task(id);
        }
        Ok(polled)
    }

    /// Run one turn; `Ok(false)` when there was nothing to run
    pub fn tick(&self) -> Result<bool, HostError> {
        self.run_microtasks()?;

        let Some(task) = self.next_macrotask() else {
            trace!("Host::tick: idle");
            return Ok(false);
        };

        self.inner.stats.borrow_mut().turns += 1;
        trace!(turn = self.turns(), now = self.now(), ?task, "Host::tick: running turn");
        task.run();
        self.run_microtasks()?;
        Ok(true)
    }

    /// Run turns until nothing is runnable; returns the turns taken
    pub fn run_until_idle(&self) -> Result<u64, HostError> {
        debug!("Host::run_until_idle: called");
        let start = self.turns();
        while self.tick()? {
            if self.turns() - start >= self.inner.config.max_turns {
                return Err(HostError::TurnLimit {
                    limit: self.inner.config.max_turns,
                });
            }
        }
        Ok(self.turns() - start)
    }

    /// Drive the loop until `fut` completes
    ///
    /// Other tasks keep whatever state they reached; call
    /// [`run_until_idle`](Self::run_until_idle) to finish them too.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output, HostError>
    where
        F: Future + 'static,
    {
        debug!("Host::block_on: called");
        let slot = Rc::new(RefCell::new(None));
        let out = slot.clone();
        self.spawn(async move {
            let value = fut.await;
            *out.borrow_mut() = Some(value);
        });

        let start = self.turns();
        self.run_microtasks()?;
        loop {
            let done = slot.borrow_mut().take();
            if let Some(value) = done {
                return Ok(value);
            }
            if self.turns() - start >= self.inner.config.max_turns {
                return Err(HostError::TurnLimit {
                    limit: self.inner.config.max_turns,
                });
            }
            if !self.tick()? {
                debug!("Host::block_on: stalled");
                return Err(HostError::Stalled);
            }
        }
    }

    fn next_macrotask(&self) -> Option<Macrotask> {
        self.promote_due_timers();
        if let Some(task) = self.inner.macrotasks.borrow_mut().pop_front() {
            return Some(task);
        }
        if let Some(signal) = self.inner.turn_waiters.borrow_mut().pop_front() {
            return Some(Macrotask::Signal(signal));
        }

        let deadline = self.inner.timers.borrow().peek().map(|t| t.deadline)?;
        trace!(from = self.now(), to = deadline, "Host::next_macrotask: advancing time");
        self.inner.now.set(deadline);
        self.promote_due_timers();
        self.inner.macrotasks.borrow_mut().pop_front()
    }

    fn promote_due_timers(&self) {
        let now = self.now();
        let mut timers = self.inner.timers.borrow_mut();
        let mut macrotasks = self.inner.macrotasks.borrow_mut();
        while timers.peek().is_some_and(|t| t.deadline <= now) {
            if let Some(timer) = timers.pop() {
                macrotasks.push_back(timer.task);
                self.inner.stats.borrow_mut().timers_fired += 1;
            }
        }
    }

    fn poll_task(&self, id: TaskId) {
        // Taken out of the map so the task may spawn while being polled
        let Some(mut fut) = self.inner.tasks.borrow_mut().remove(&id) else {
            return;
        };
        let waker = futures::task::waker(Arc::new(TaskWaker {
            id,
            ready: self.inner.ready.clone(),
        }));
        let mut cx = Context::from_waker(&waker);
        self.inner.stats.borrow_mut().polls += 1;

        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                trace!(task = id.0, "Host::poll_task: complete");
                self.inner.stats.borrow_mut().tasks_completed += 1;
            }
            Poll::Pending => {
                self.inner.tasks.borrow_mut().insert(id, fut);
            }
        }
    }

    fn push_ready(&self, id: TaskId) {
        self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner).push(id);
    }

    fn pop_ready(&self) -> Option<TaskId> {
        self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn ready_is_empty(&self) -> bool {
        self.inner.ready.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

impl HostInner {
    fn push_timer(&self, delay_ms: u64, task: Macrotask) {
        let seq = self.next_timer.get();
        self.next_timer.set(seq + 1);
        self.timers.borrow_mut().push(TimerEntry {
            deadline: self.now.get().saturating_add(delay_ms),
            seq,
            task,
        });
    }
}

impl HostLoop for Host {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        self.spawn(fut);
        Ok(())
    }

    fn next_turn(&self) -> LocalBoxFuture<'static, ()> {
        Host::next_turn(self).boxed_local()
    }
}

/// Future returned by [`Host::next_turn`]
pub struct NextTurn {
    host: Weak<HostInner>,
    signal: Option<Rc<Signal>>,
}

impl Future for NextTurn {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if let Some(signal) = &this.signal {
            if signal.fired() {
                return Poll::Ready(());
            }
            signal.park(cx.waker());
            return Poll::Pending;
        }

        let Some(host) = this.host.upgrade() else {
            return Poll::Ready(());
        };
        let signal = Rc::new(Signal::default());
        signal.park(cx.waker());
        host.turn_waiters.borrow_mut().push_back(signal.clone());
        this.signal = Some(signal);
        Poll::Pending
    }
}

/// Future returned by [`Host::sleep`]
pub struct Sleep {
    host: Weak<HostInner>,
    delay_ms: u64,
    signal: Option<Rc<Signal>>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if let Some(signal) = &this.signal {
            if signal.fired() {
                return Poll::Ready(());
            }
            signal.park(cx.waker());
            return Poll::Pending;
        }

        let Some(host) = this.host.upgrade() else {
            return Poll::Ready(());
        };
        let signal = Rc::new(Signal::default());
        signal.park(cx.waker());
        host.push_timer(this.delay_ms, Macrotask::Signal(signal.clone()));
        this.signal = Some(signal);
        Poll::Pending
    }
}
