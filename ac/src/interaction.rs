//! Interaction-tracing propagation
//!
//! Whatever tracing context is current when the outermost act scope is
//! entered stays current for the callback body and for every flush pass of
//! that scope, including passes on later host turns.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;

/// Opaque tracing context captured by an [`InteractionTracer`]
#[derive(Clone, Default)]
pub struct ContextHandle(Option<Rc<dyn Any>>);

impl ContextHandle {
    /// The empty context
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any>(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    pub fn from_rc(value: Rc<dyn Any>) -> Self {
        Self(Some(value))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the context as the tracer's own type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("ContextHandle(..)"),
            None => f.write_str("ContextHandle(none)"),
        }
    }
}

/// The interaction-tracing subsystem, seen from the coordinator
pub trait InteractionTracer {
    /// Capture the context that is current right now
    fn capture(&self) -> ContextHandle;

    /// Run `body` with `ctx` as the current context, restoring the previous
    /// context afterwards
    fn run_with(&self, ctx: &ContextHandle, body: &mut dyn FnMut());
}

/// Tracer for hosts without interaction tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl InteractionTracer for NoopTracer {
    fn capture(&self) -> ContextHandle {
        ContextHandle::none()
    }

    fn run_with(&self, _ctx: &ContextHandle, body: &mut dyn FnMut()) {
        body()
    }
}

/// Run a value-returning closure inside `ctx`
pub(crate) fn within<T>(tracer: &dyn InteractionTracer, ctx: &ContextHandle, f: impl FnOnce() -> T) -> T {
    let mut f = Some(f);
    let mut out = None;
    tracer.run_with(ctx, &mut || {
        if let Some(f) = f.take() {
            out = Some(f());
        }
    });
    match out {
        Some(out) => out,
        // A tracer that skips the body breaks the contract; run it bare.
        None => match f.take() {
            Some(f) => f(),
            None => unreachable!("body ran but produced no value"),
        },
    }
}

/// Polls the wrapped future inside a captured context
///
/// Each poll re-establishes the context, so the future's body sees it on
/// every resumption, not only up to its first suspension point.
pub struct Traced<T> {
    inner: LocalBoxFuture<'static, T>,
    tracer: Rc<dyn InteractionTracer>,
    ctx: ContextHandle,
}

impl<T> Traced<T> {
    pub fn new(inner: LocalBoxFuture<'static, T>, tracer: Rc<dyn InteractionTracer>, ctx: ContextHandle) -> Self {
        Self { inner, tracer, ctx }
    }
}

impl<T> Future for Traced<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let inner = &mut this.inner;
        within(this.tracer.as_ref(), &this.ctx, || inner.as_mut().poll(cx))
    }
}
