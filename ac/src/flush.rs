//! Flush engine
//!
//! Drains the scheduler surface to a fixed point: render work first, then
//! deferred effects, repeated while either produced anything. The
//! asynchronous drain repeats that across host turns until a turn finds no
//! new work.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::ActError;
use crate::host::HostLoop;
use crate::interaction::{ContextHandle, InteractionTracer, within};
use crate::surface::SchedulerSurface;

/// Drives flush passes against one scheduler surface
pub struct FlushEngine {
    surface: Rc<dyn SchedulerSurface>,
    tracer: Rc<dyn InteractionTracer>,
    max_passes: usize,
}

impl FlushEngine {
    pub fn new(surface: Rc<dyn SchedulerSurface>, tracer: Rc<dyn InteractionTracer>, max_passes: usize) -> Self {
        debug!(max_passes, "FlushEngine::new: called");
        Self {
            surface,
            tracer,
            max_passes: max_passes.max(1),
        }
    }

    pub fn surface(&self) -> &Rc<dyn SchedulerSurface> {
        &self.surface
    }

    pub fn tracer(&self) -> &Rc<dyn InteractionTracer> {
        &self.tracer
    }

    /// Does the surface report any pending work?
    pub fn has_pending(&self) -> bool {
        self.surface.has_pending_sync_work() || self.surface.has_pending_effects()
    }

    /// One flush pass inside `ctx`; returns whether it ran anything
    fn pass(&self, ctx: &ContextHandle) -> Result<bool, ActError> {
        within(self.tracer.as_ref(), ctx, || {
            let mut did_work = false;
            if self.surface.has_pending_sync_work() {
                trace!("FlushEngine::pass: flushing sync work");
                self.surface.flush_sync_work().map_err(ActError::Flush)?;
                did_work = true;
            }
            if self.surface.has_pending_effects() {
                trace!("FlushEngine::pass: flushing effects");
                self.surface.flush_effects().map_err(ActError::Flush)?;
                did_work = true;
            }
            Ok(did_work)
        })
    }

    /// Flush until a pass finds nothing to run
    ///
    /// Returns the number of passes that ran work. The first error aborts
    /// the loop. Work still pending after `max_passes` passes is a
    /// [`ActError::FlushLimit`]; settling in exactly `max_passes` is not.
    pub fn flush_to_fixed_point(&self, ctx: &ContextHandle) -> Result<usize, ActError> {
        let mut passes = 0;
        while self.pass(ctx)? {
            passes += 1;
            if passes >= self.max_passes && self.has_pending() {
                debug!(passes, "FlushEngine::flush_to_fixed_point: pass limit reached");
                return Err(ActError::FlushLimit { passes });
            }
        }
        debug!(passes, "FlushEngine::flush_to_fixed_point: settled");
        Ok(passes)
    }

    /// Flush, then keep flushing once per host turn until a turn finds
    /// nothing new
    pub async fn drain(&self, host: &dyn HostLoop, ctx: &ContextHandle) -> Result<(), ActError> {
        debug!("FlushEngine::drain: called");
        self.flush_to_fixed_point(ctx)?;
        let mut turns = 0usize;
        loop {
            host.next_turn().await;
            turns += 1;
            if self.flush_to_fixed_point(ctx)? == 0 {
                debug!(turns, "FlushEngine::drain: settled");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::NoopTracer;
    use crate::surface::UpdateHook;
    use std::cell::{Cell, RefCell};

    /// Surface with countdowns for pending work; each effect flush may
    /// queue more render work
    #[derive(Default)]
    struct ScriptedSurface {
        renders: Cell<u32>,
        effects: Cell<u32>,
        renders_from_effects: Cell<u32>,
        fail_effects: Cell<bool>,
        log: RefCell<Vec<&'static str>>,
    }

    impl SchedulerSurface for ScriptedSurface {
        fn has_pending_sync_work(&self) -> bool {
            self.renders.get() > 0
        }

        fn flush_sync_work(&self) -> eyre::Result<()> {
            self.log.borrow_mut().push("render");
            self.renders.set(0);
            Ok(())
        }

        fn has_pending_effects(&self) -> bool {
            self.effects.get() > 0
        }

        fn flush_effects(&self) -> eyre::Result<()> {
            self.log.borrow_mut().push("effects");
            if self.fail_effects.get() {
                eyre::bail!("effect failed");
            }
            self.effects.set(self.effects.get() - 1);
            if self.renders_from_effects.get() > 0 {
                self.renders_from_effects.set(self.renders_from_effects.get() - 1);
                self.renders.set(1);
            }
            Ok(())
        }

        fn on_update_outside_scope(&self, _hook: UpdateHook) {}
    }

    fn engine(surface: &Rc<ScriptedSurface>, max_passes: usize) -> FlushEngine {
        FlushEngine::new(surface.clone(), Rc::new(NoopTracer), max_passes)
    }

    #[test]
    fn test_idle_surface_takes_no_passes() {
        let surface = Rc::new(ScriptedSurface::default());
        assert_eq!(engine(&surface, 10).flush_to_fixed_point(&ContextHandle::none()).unwrap(), 0);
        assert!(surface.log.borrow().is_empty());
    }

    #[test]
    fn test_effects_that_schedule_renders_are_followed() {
        let surface = Rc::new(ScriptedSurface::default());
        surface.renders.set(1);
        surface.effects.set(2);
        surface.renders_from_effects.set(1);

        let passes = engine(&surface, 10).flush_to_fixed_point(&ContextHandle::none()).unwrap();

        assert_eq!(passes, 2);
        assert_eq!(*surface.log.borrow(), vec!["render", "effects", "render", "effects"]);
        assert!(!engine(&surface, 10).has_pending());
    }

    #[test]
    fn test_error_aborts_immediately() {
        let surface = Rc::new(ScriptedSurface::default());
        surface.renders.set(1);
        surface.effects.set(5);
        surface.fail_effects.set(true);

        let err = engine(&surface, 10).flush_to_fixed_point(&ContextHandle::none()).unwrap_err();

        assert!(err.is_flush());
        assert_eq!(err.to_string(), "effect failed");
        assert_eq!(*surface.log.borrow(), vec!["render", "effects"]);
    }

    #[test]
    fn test_pass_limit() {
        let surface = Rc::new(ScriptedSurface::default());
        surface.effects.set(100);

        let err = engine(&surface, 3).flush_to_fixed_point(&ContextHandle::none()).unwrap_err();
        assert!(matches!(err, ActError::FlushLimit { passes: 3 }));
    }

    #[test]
    fn test_settling_on_last_allowed_pass_is_ok() {
        let surface = Rc::new(ScriptedSurface::default());
        surface.renders.set(1);
        assert_eq!(engine(&surface, 1).flush_to_fixed_point(&ContextHandle::none()).unwrap(), 1);

        surface.renders.set(1);
        surface.effects.set(2);
        surface.renders_from_effects.set(1);
        assert_eq!(engine(&surface, 2).flush_to_fixed_point(&ContextHandle::none()).unwrap(), 2);
    }
}
