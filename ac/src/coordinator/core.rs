//! Coordinator entry point

use std::future::Future;
use std::rc::Rc;

use futures::future::FutureExt;
use tracing::{debug, info};

use super::handle::{Act, AsyncAct, SyncAct, Ticket};
use crate::config::ActConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::ActError;
use crate::flush::FlushEngine;
use crate::host::HostLoop;
use crate::interaction::{ContextHandle, InteractionTracer, NoopTracer, Traced, within};
use crate::outcome::{ActReturn, AsyncOutcome, CallbackOutcome, Deferred};
use crate::state::{CoordinatorState, ScopeGuard, ScopeMode, StateSnapshot};
use crate::surface::SchedulerSurface;

/// Builder for [`Coordinator`]
pub struct CoordinatorBuilder {
    surface: Rc<dyn SchedulerSurface>,
    host: Rc<dyn HostLoop>,
    tracer: Rc<dyn InteractionTracer>,
    diagnostics: Rc<dyn DiagnosticSink>,
    config: ActConfig,
}

impl CoordinatorBuilder {
    /// Interaction tracer whose context is propagated (default: none)
    pub fn with_tracer(mut self, tracer: Rc<dyn InteractionTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Where usage diagnostics go (default: `tracing` at WARN)
    pub fn with_diagnostics(mut self, diagnostics: Rc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_config(mut self, config: ActConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the coordinator and register its update hook on the surface
    pub fn build(self) -> Coordinator {
        debug!(config = ?self.config, "CoordinatorBuilder::build: called");
        let state = CoordinatorState::new();
        let engine = Rc::new(FlushEngine::new(
            self.surface.clone(),
            self.tracer.clone(),
            self.config.max_flush_passes,
        ));

        if self.config.warn_unwrapped_updates {
            debug!("CoordinatorBuilder::build: registering update hook");
            let weak = Rc::downgrade(&state);
            let sink = self.diagnostics.clone();
            self.surface.on_update_outside_scope(Rc::new(move |source: &str| {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                if !state.is_acting() {
                    sink.report(Diagnostic::UpdateNotWrapped {
                        source: source.to_string(),
                    });
                }
            }));
        }

        info!("Coordinator ready (max_flush_passes: {})", self.config.max_flush_passes);
        Coordinator {
            state,
            engine,
            host: self.host,
            tracer: self.tracer,
            diagnostics: self.diagnostics,
            config: self.config,
        }
    }
}

/// Runs callbacks in an act scope and drains the scheduler they touch
///
/// Scope state is shared by every invocation made through one coordinator:
/// nested calls fold into the outermost scope.
pub struct Coordinator {
    state: Rc<CoordinatorState>,
    engine: Rc<FlushEngine>,
    host: Rc<dyn HostLoop>,
    tracer: Rc<dyn InteractionTracer>,
    diagnostics: Rc<dyn DiagnosticSink>,
    config: ActConfig,
}

impl Coordinator {
    /// Coordinator with default tracer, diagnostics and config
    pub fn new(surface: Rc<dyn SchedulerSurface>, host: Rc<dyn HostLoop>) -> Self {
        Self::builder(surface, host).build()
    }

    pub fn builder(surface: Rc<dyn SchedulerSurface>, host: Rc<dyn HostLoop>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            surface,
            host,
            tracer: Rc::new(NoopTracer),
            diagnostics: Rc::new(TracingSink),
            config: ActConfig::default(),
        }
    }

    pub fn config(&self) -> &ActConfig {
        &self.config
    }

    pub fn state(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Is any act scope active?
    pub fn is_acting(&self) -> bool {
        self.state.is_acting()
    }

    /// Run `callback` in an act scope
    ///
    /// The return value picks the mode. `()` (or a bare value, which is
    /// reported) gives a synchronous scope, flushed to a fixed point before
    /// this returns. A [`Deferred`] gives an asynchronous scope whose drain
    /// starts on the host immediately.
    pub fn act<F, R>(&self, callback: F) -> Act
    where
        F: FnOnce() -> R,
        R: ActReturn,
    {
        debug!(depth = self.state.depth(), "Coordinator::act: called");
        let guard = ScopeGuard::enter(&self.state, ScopeMode::Sync, || self.tracer.capture());
        let ctx = self.state.context();
        let outcome = within(self.tracer.as_ref(), &ctx, || callback().into_outcome());

        match outcome {
            CallbackOutcome::Unit => {
                debug!("Coordinator::act: sync scope");
                Act::Sync(self.finish_sync(guard, &ctx))
            }
            CallbackOutcome::Value(returned) => {
                debug!(%returned, "Coordinator::act: callback returned a bare value");
                self.diagnostics.report(Diagnostic::InvalidReturn { returned });
                Act::Sync(self.finish_sync(guard, &ctx))
            }
            CallbackOutcome::Failed(report) => {
                debug!("Coordinator::act: callback failed");
                drop(guard);
                Act::Sync(SyncAct::new(Err(ActError::Callback(report)), self.diagnostics.clone()))
            }
            CallbackOutcome::Deferred(deferred) => {
                debug!("Coordinator::act: async scope");
                Act::Async(self.start_async(guard, ctx, deferred))
            }
        }
    }

    /// Run an asynchronous callback in an act scope
    pub fn act_async<F, Fut>(&self, callback: F) -> AsyncAct
    where
        F: FnOnce() -> Fut,
        Fut: Future + 'static,
        Fut::Output: AsyncOutcome,
    {
        debug!(depth = self.state.depth(), "Coordinator::act_async: called");
        let guard = ScopeGuard::enter(&self.state, ScopeMode::Async, || self.tracer.capture());
        let ctx = self.state.context();
        let deferred = within(self.tracer.as_ref(), &ctx, || Deferred::new(callback()));
        self.start_async(guard, ctx, deferred)
    }

    fn finish_sync(&self, guard: ScopeGuard, ctx: &ContextHandle) -> SyncAct {
        let result = self.engine.flush_to_fixed_point(ctx).map(|passes| {
            debug!(passes, "Coordinator::finish_sync: flushed");
        });
        drop(guard);
        SyncAct::new(result, self.diagnostics.clone())
    }

    fn start_async(&self, guard: ScopeGuard, ctx: ContextHandle, deferred: Deferred) -> AsyncAct {
        self.state.promote(ScopeMode::Async);
        if self.state.begin_async() {
            debug!("Coordinator::start_async: another scope is draining");
            self.diagnostics.report(Diagnostic::OverlappingScopes);
        }

        let ticket = Rc::new(Ticket::default());
        let scope = AsyncScope {
            state: self.state.clone(),
            drained: false,
            _guard: guard,
        };
        let callback = Traced::new(deferred.into_future(), self.tracer.clone(), ctx.clone());
        let engine = self.engine.clone();
        let host = self.host.clone();

        let drain = async move {
            let mut scope = scope;
            match callback.await {
                Ok(()) => {
                    scope.enter_drain();
                    engine.drain(host.as_ref(), &ctx).await
                }
                Err(report) => Err(ActError::Callback(report)),
            }
        };

        let (remote, handle) = drain.remote_handle();
        if let Err(err) = self.host.spawn_local(remote.boxed_local()) {
            debug!(%err, "Coordinator::start_async: spawn failed");
            ticket.observe();
            return AsyncAct::failed(ActError::Spawn(err), ticket);
        }

        if self.config.warn_unawaited {
            self.spawn_unawaited_check(ticket.clone());
        }
        AsyncAct::running(handle, ticket)
    }

    /// Report the scope if nobody has observed it by the next host turn
    fn spawn_unawaited_check(&self, ticket: Rc<Ticket>) {
        let host = self.host.clone();
        let sink = self.diagnostics.clone();
        let check = async move {
            host.next_turn().await;
            if !ticket.is_observed() {
                debug!("Coordinator::unawaited_check: scope was not awaited");
                sink.report(Diagnostic::NotAwaited);
            }
        };
        if let Err(err) = self.host.spawn_local(check.boxed_local()) {
            debug!(%err, "Coordinator::spawn_unawaited_check: spawn failed");
        }
    }
}

/// Keeps an asynchronous scope open until its drain settles or is dropped
struct AsyncScope {
    state: Rc<CoordinatorState>,
    drained: bool,
    _guard: ScopeGuard,
}

impl AsyncScope {
    fn enter_drain(&mut self) {
        self.state.enter_drain();
        self.drained = true;
    }
}

impl Drop for AsyncScope {
    fn drop(&mut self) {
        // runs before `_guard` releases the depth
        self.state.end_async(self.drained);
    }
}
