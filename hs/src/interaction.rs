//! Interaction tracking
//!
//! Named interactions ("click", "submit", ...) are pushed onto a current
//! set while their body runs. The scheduler stamps every commit and effect
//! run with the set current at that moment.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use actcoord::{ContextHandle, InteractionTracer};
use serde::Serialize;
use tracing::debug;

/// One tracked interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub id: u64,
    pub name: String,
}

type InteractionSet = Rc<Vec<Interaction>>;

#[derive(Default)]
struct InteractionsInner {
    current: RefCell<InteractionSet>,
    next_id: Cell<u64>,
}

/// Tracks the current interaction set
///
/// Cheap to clone; clones share one tracker.
#[derive(Clone, Default)]
pub struct Interactions {
    inner: Rc<InteractionsInner>,
}

impl Interactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` with a new interaction named `name` added to the current set
    pub fn track<R>(&self, name: &str, body: impl FnOnce() -> R) -> R {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        debug!(id, name, "Interactions::track: called");

        let mut set = self.current();
        set.push(Interaction {
            id,
            name: name.to_string(),
        });
        let _restore = self.swap(Rc::new(set));
        body()
    }

    /// The current interaction set
    pub fn current(&self) -> Vec<Interaction> {
        self.inner.current.borrow().as_ref().clone()
    }

    /// Names in the current set, in the order they were tracked
    pub fn current_names(&self) -> Vec<String> {
        self.inner.current.borrow().iter().map(|i| i.name.clone()).collect()
    }

    fn swap(&self, set: InteractionSet) -> Restore {
        let previous = self.inner.current.replace(set);
        Restore {
            inner: self.inner.clone(),
            previous: Some(previous),
        }
    }
}

/// Puts the previous set back on drop
struct Restore {
    inner: Rc<InteractionsInner>,
    previous: Option<InteractionSet>,
}

impl Drop for Restore {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.inner.current.borrow_mut() = previous;
        }
    }
}

impl InteractionTracer for Interactions {
    fn capture(&self) -> ContextHandle {
        let set = self.inner.current.borrow().clone();
        if set.is_empty() {
            ContextHandle::none()
        } else {
            ContextHandle::new(set)
        }
    }

    fn run_with(&self, ctx: &ContextHandle, body: &mut dyn FnMut()) {
        let set = ctx.downcast_ref::<InteractionSet>().cloned().unwrap_or_default();
        let _restore = self.swap(set);
        body();
    }
}
