//! Classification of what an act callback returned
//!
//! The callback's return value is inspected exactly once, at the call
//! boundary, and turned into a [`CallbackOutcome`]. The rest of the
//! invocation only looks at the resulting tag.

use std::fmt;
use std::future::Future;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::state::ScopeMode;

/// A deferred result returned by an asynchronous act callback
pub struct Deferred {
    fut: LocalBoxFuture<'static, eyre::Result<()>>,
}

impl Deferred {
    /// Wrap a future resolving to `()` or `Result<(), E>`
    ///
    /// An error resolves the deferred result unchanged, so it fails the
    /// invocation as-is.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future + 'static,
        F::Output: AsyncOutcome,
    {
        Self {
            fut: fut.map(AsyncOutcome::into_result).boxed_local(),
        }
    }

    pub(crate) fn into_future(self) -> LocalBoxFuture<'static, eyre::Result<()>> {
        self.fut
    }
}

/// What an asynchronous callback's future may resolve to
pub trait AsyncOutcome {
    fn into_result(self) -> eyre::Result<()>;
}

impl AsyncOutcome for () {
    fn into_result(self) -> eyre::Result<()> {
        Ok(())
    }
}

impl<E: Into<eyre::Report>> AsyncOutcome for Result<(), E> {
    fn into_result(self) -> eyre::Result<()> {
        self.map_err(Into::into)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// What the callback produced
#[derive(Debug)]
pub enum CallbackOutcome {
    /// Returned nothing: synchronous scope
    Unit,
    /// Returned a deferred result: asynchronous scope
    Deferred(Deferred),
    /// Returned a bare value, described for the diagnostic
    Value(String),
    /// The callback raised an error
    Failed(eyre::Report),
}

impl CallbackOutcome {
    /// The scope mode this outcome selects
    pub fn mode(&self) -> ScopeMode {
        match self {
            Self::Deferred(_) => ScopeMode::Async,
            _ => ScopeMode::Sync,
        }
    }
}

/// Types an act callback may return
pub trait ActReturn {
    fn into_outcome(self) -> CallbackOutcome;
}

impl ActReturn for () {
    fn into_outcome(self) -> CallbackOutcome {
        CallbackOutcome::Unit
    }
}

impl ActReturn for Deferred {
    fn into_outcome(self) -> CallbackOutcome {
        CallbackOutcome::Deferred(self)
    }
}

impl ActReturn for CallbackOutcome {
    fn into_outcome(self) -> CallbackOutcome {
        self
    }
}

impl<T, E> ActReturn for Result<T, E>
where
    T: ActReturn,
    E: Into<eyre::Report>,
{
    fn into_outcome(self) -> CallbackOutcome {
        match self {
            Ok(value) => value.into_outcome(),
            Err(err) => CallbackOutcome::Failed(err.into()),
        }
    }
}

/// `None` plays the part of a null return
impl<T: fmt::Debug> ActReturn for Option<T> {
    fn into_outcome(self) -> CallbackOutcome {
        match self {
            None => CallbackOutcome::Value("None".to_string()),
            Some(value) => CallbackOutcome::Value(format!("Some({:?})", value)),
        }
    }
}

macro_rules! bare_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ActReturn for $ty {
                fn into_outcome(self) -> CallbackOutcome {
                    CallbackOutcome::Value(format!("{:?}", self))
                }
            }
        )*
    };
}

bare_value!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String, &'static str,
);
