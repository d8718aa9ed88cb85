//! Host event-loop boundary
//!
//! Asynchronous act scopes need two things from the host: somewhere to run
//! the drain task, and a way to wait one turn between drain passes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::executor::LocalSpawner;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{LocalSpawnExt, SpawnError};
use tracing::debug;

/// A single-threaded host event loop
pub trait HostLoop {
    /// Run `fut` on the host, detached
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError>;

    /// Resolve after the host has run everything currently due
    fn next_turn(&self) -> LocalBoxFuture<'static, ()>;
}

impl<H: HostLoop + ?Sized> HostLoop for std::rc::Rc<H> {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        (**self).spawn_local(fut)
    }

    fn next_turn(&self) -> LocalBoxFuture<'static, ()> {
        (**self).next_turn()
    }
}

/// Returns `Pending` exactly once, waking itself
///
/// On executors without a notion of turns this lets every other ready
/// task run before the yielding task is polled again.
#[derive(Debug, Default)]
pub struct YieldTurn {
    yielded: bool,
}

impl Future for YieldTurn {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl HostLoop for LocalSpawner {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        debug!("LocalSpawner::spawn_local: called");
        LocalSpawnExt::spawn_local(self, fut)
    }

    fn next_turn(&self) -> LocalBoxFuture<'static, ()> {
        YieldTurn::default().boxed_local()
    }
}

/// Host backed by a tokio `LocalSet`
///
/// Outside any tokio runtime, `spawn_local` returns a shutdown
/// [`SpawnError`].
///
/// # Panics
///
/// `spawn_local` panics when called inside a runtime but outside a
/// `LocalSet` (`LocalSet::run_until` or a task spawned on the set), as
/// `tokio::task::spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl HostLoop for TokioHost {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        debug!("TokioHost::spawn_local: called");
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("TokioHost::spawn_local: no runtime");
            return Err(SpawnError::shutdown());
        }
        drop(tokio::task::spawn_local(fut));
        Ok(())
    }

    fn next_turn(&self) -> LocalBoxFuture<'static, ()> {
        tokio::task::yield_now().boxed_local()
    }
}
