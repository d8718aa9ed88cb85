//! Scheduler Surface boundary
//!
//! The coordinator never looks inside scheduled work. It only asks the
//! surface whether work is pending and tells it to run that work.

use std::rc::Rc;

/// Hook invoked by the surface for every scheduler-visible update
///
/// The argument names the update's source (a component, a cell, ...).
pub type UpdateHook = Rc<dyn Fn(&str)>;

/// The scheduler being coordinated
pub trait SchedulerSurface {
    /// Is a render pass (or other synchronous work) pending?
    fn has_pending_sync_work(&self) -> bool;

    /// Run all pending synchronous work
    fn flush_sync_work(&self) -> eyre::Result<()>;

    /// Is a batch of deferred effects pending?
    fn has_pending_effects(&self) -> bool;

    /// Run the pending deferred effects
    fn flush_effects(&self) -> eyre::Result<()>;

    /// Register the hook the surface calls on every update
    ///
    /// The surface reports every update; deciding whether an act scope is
    /// active is the coordinator's job.
    fn on_update_outside_scope(&self, hook: UpdateHook);
}

impl<S: SchedulerSurface + ?Sized> SchedulerSurface for Rc<S> {
    fn has_pending_sync_work(&self) -> bool {
        (**self).has_pending_sync_work()
    }

    fn flush_sync_work(&self) -> eyre::Result<()> {
        (**self).flush_sync_work()
    }

    fn has_pending_effects(&self) -> bool {
        (**self).has_pending_effects()
    }

    fn flush_effects(&self) -> eyre::Result<()> {
        (**self).flush_effects()
    }

    fn on_update_outside_scope(&self, hook: UpdateHook) {
        (**self).on_update_outside_scope(hook)
    }
}
