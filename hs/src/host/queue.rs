//! Queue types for the host

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Waker;

use futures::task::ArcWake;

/// Identifier of a spawned task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Tasks woken since they were last polled, in wake order
///
/// A task appears at most once no matter how often it is woken.
#[derive(Debug, Default)]
pub(crate) struct ReadyList {
    order: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

impl ReadyList {
    pub fn push(&mut self, id: TaskId) {
        if self.queued.insert(id) {
            self.order.push_back(id);
        }
    }

    pub fn pop(&mut self) -> Option<TaskId> {
        let id = self.order.pop_front()?;
        self.queued.remove(&id);
        Some(id)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub(crate) type ReadyQueue = Arc<Mutex<ReadyList>>;

/// Pushes its task onto the ready queue when woken
pub(crate) struct TaskWaker {
    pub id: TaskId,
    pub ready: ReadyQueue,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self
            .ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(arc_self.id);
    }
}

/// One-shot signal a waiting future parks on
#[derive(Default)]
pub(crate) struct Signal {
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl Signal {
    pub fn fired(&self) -> bool {
        self.fired.get()
    }

    pub fn park(&self, waker: &Waker) {
        *self.waker.borrow_mut() = Some(waker.clone());
    }

    pub fn fire(&self) {
        self.fired.set(true);
        let waker = self.waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Work the host runs as one turn
pub(crate) enum Macrotask {
    Signal(Rc<Signal>),
    Callback(Box<dyn FnOnce()>),
}

impl Macrotask {
    pub fn run(self) {
        match self {
            Self::Signal(signal) => signal.fire(),
            Self::Callback(f) => f(),
        }
    }
}

impl fmt::Debug for Macrotask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(_) => f.write_str("Macrotask::Signal"),
            Self::Callback(_) => f.write_str("Macrotask::Callback"),
        }
    }
}

/// A timer waiting for virtual time to reach its deadline
#[derive(Debug)]
pub(crate) struct TimerEntry {
    pub deadline: u64,
    pub seq: u64,
    pub task: Macrotask,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earlier deadline first, then earlier registration (max-heap)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Statistics for the host
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostStats {
    pub turns: u64,
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    pub polls: u64,
    pub timers_fired: u64,
}
