//! State cells

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::core::SchedulerInner;
use super::queue::CellId;

/// A piece of scheduler-managed state
///
/// Reads see the last committed value. Writes are queued and applied, in
/// order, by the next render pass.
pub struct StateCell<T> {
    id: CellId,
    name: Rc<str>,
    value: Rc<RefCell<T>>,
    scheduler: Weak<SchedulerInner>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            value: self.value.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> StateCell<T> {
    pub(crate) fn new(id: CellId, name: &str, initial: T, scheduler: Weak<SchedulerInner>) -> Self {
        Self {
            id,
            name: Rc::from(name),
            value: Rc::new(RefCell::new(initial)),
            scheduler,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The committed value
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Queue a replacement value
    pub fn set(&self, value: T) {
        let slot = self.value.clone();
        self.enqueue(Box::new(move || *slot.borrow_mut() = value));
    }

    /// Queue an update computed from the value current when it is applied
    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        let slot = self.value.clone();
        self.enqueue(Box::new(move || {
            let next = f(&slot.borrow());
            *slot.borrow_mut() = next;
        }));
    }

    fn enqueue(&self, apply: Box<dyn FnOnce()>) {
        trace!(cell = %self.name, "StateCell::enqueue: called");
        match self.scheduler.upgrade() {
            Some(scheduler) => scheduler.enqueue(self.id, &self.name, apply),
            // No scheduler left to batch against
            None => apply(),
        }
    }
}
