//! Act coordinator errors

use futures::task::SpawnError;
use thiserror::Error;

/// Errors that fail an act invocation
///
/// `Callback` and `Flush` are transparent: their message is the original
/// error's message, and the original error can be recovered through
/// [`ActError::report`] and `downcast_ref`.
#[derive(Debug, Error)]
pub enum ActError {
    /// Raised by the wrapped callback (or its deferred result)
    #[error(transparent)]
    Callback(eyre::Report),

    /// Raised while flushing sync work or deferred effects
    #[error(transparent)]
    Flush(eyre::Report),

    /// A single flush never reached a fixed point
    #[error("Flush did not settle after {passes} passes")]
    FlushLimit { passes: usize },

    /// The host refused the drain task
    #[error("Failed to spawn act drain: {0}")]
    Spawn(#[from] SpawnError),

    /// `into_result` was called on an asynchronous scope
    #[error("act scope is asynchronous and must be awaited")]
    NotSynchronous,
}

impl ActError {
    /// The original error raised by the callback or a flushed unit
    pub fn report(&self) -> Option<&eyre::Report> {
        match self {
            Self::Callback(report) | Self::Flush(report) => Some(report),
            _ => None,
        }
    }

    /// Consume into the original error, if there is one
    pub fn into_report(self) -> Option<eyre::Report> {
        match self {
            Self::Callback(report) | Self::Flush(report) => Some(report),
            _ => None,
        }
    }

    /// True for errors raised by the callback itself
    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }

    /// True for errors raised while flushing scheduler work
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush(_))
    }
}
