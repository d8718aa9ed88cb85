//! Handles returned by act invocations

use std::cell::Cell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture, RemoteHandle, Ready, ready};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ActError;
use crate::state::ScopeMode;

/// Tracks whether the caller ever observed an asynchronous scope's result
#[derive(Debug, Default)]
pub(crate) struct Ticket {
    observed: Cell<bool>,
}

impl Ticket {
    pub(crate) fn observe(&self) {
        self.observed.set(true);
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observed.get()
    }
}

/// Result of one act invocation
#[must_use = "an act invocation carries its error; call into_result() or await it"]
pub enum Act {
    /// The callback returned nothing; everything was flushed before return
    Sync(SyncAct),
    /// The callback returned a deferred result; the scope settles later
    Async(AsyncAct),
}

impl Act {
    pub fn mode(&self) -> ScopeMode {
        match self {
            Self::Sync(_) => ScopeMode::Sync,
            Self::Async(_) => ScopeMode::Async,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// The outcome of a synchronous scope
    ///
    /// An asynchronous scope yields [`ActError::NotSynchronous`]; its drain
    /// keeps running.
    pub fn into_result(self) -> Result<(), ActError> {
        match self {
            Self::Sync(act) => act.into_result(),
            Self::Async(act) => {
                debug!("Act::into_result: called on async scope");
                act.ticket.observe();
                Err(ActError::NotSynchronous)
            }
        }
    }
}

impl IntoFuture for Act {
    type Output = Result<(), ActError>;
    type IntoFuture = LocalBoxFuture<'static, Result<(), ActError>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Sync(act) => act.into_future().boxed_local(),
            Self::Async(act) => {
                act.ticket.observe();
                act.boxed_local()
            }
        }
    }
}

/// A settled synchronous scope
#[must_use = "an act invocation carries its error; call into_result()"]
pub struct SyncAct {
    result: Result<(), ActError>,
    diagnostics: Rc<dyn DiagnosticSink>,
}

impl SyncAct {
    pub(crate) fn new(result: Result<(), ActError>, diagnostics: Rc<dyn DiagnosticSink>) -> Self {
        Self { result, diagnostics }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<(), ActError> {
        self.result
    }
}

/// Awaiting a synchronous scope works, but is reported
impl IntoFuture for SyncAct {
    type Output = Result<(), ActError>;
    type IntoFuture = Ready<Result<(), ActError>>;

    fn into_future(self) -> Self::IntoFuture {
        debug!("SyncAct::into_future: called");
        self.diagnostics.report(Diagnostic::AwaitedSyncScope);
        ready(self.result)
    }
}

enum AsyncInner {
    Running(Option<RemoteHandle<Result<(), ActError>>>),
    Failed(Option<ActError>),
}

/// An asynchronous scope; resolves once its drain settles
///
/// Dropping it does not cancel the drain.
#[must_use = "an asynchronous act scope must be awaited"]
pub struct AsyncAct {
    inner: AsyncInner,
    ticket: Rc<Ticket>,
}

impl AsyncAct {
    pub(crate) fn running(handle: RemoteHandle<Result<(), ActError>>, ticket: Rc<Ticket>) -> Self {
        Self {
            inner: AsyncInner::Running(Some(handle)),
            ticket,
        }
    }

    pub(crate) fn failed(err: ActError, ticket: Rc<Ticket>) -> Self {
        Self {
            inner: AsyncInner::Failed(Some(err)),
            ticket,
        }
    }
}

impl Future for AsyncAct {
    type Output = Result<(), ActError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.ticket.observe();
        match &mut this.inner {
            AsyncInner::Running(Some(handle)) => Pin::new(handle).poll(cx),
            AsyncInner::Running(None) => Poll::Pending,
            AsyncInner::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(ActError::NotSynchronous))),
        }
    }
}

impl Drop for AsyncAct {
    fn drop(&mut self) {
        if let AsyncInner::Running(handle) = &mut self.inner {
            if let Some(handle) = handle.take() {
                handle.forget();
            }
        }
    }
}
