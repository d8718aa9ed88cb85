//! Usage diagnostics
//!
//! Misuse of the coordinator never interrupts execution. Each rule produces
//! a [`Diagnostic`] with a fixed message template, delivered to a
//! [`DiagnosticSink`]. The default sink logs through `tracing`; tests use a
//! [`Recorder`] to match on exact text.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::warn;

/// A developer-visible usage warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The callback returned something other than `()` or a deferred result
    InvalidReturn { returned: String },

    /// A synchronous scope's result was awaited
    AwaitedSyncScope,

    /// An asynchronous scope started while another was still draining
    ///
    /// Reported once per interleaving episode: further overlaps stay quiet
    /// until every asynchronous scope has settled. A scope opened and
    /// awaited inside another scope's callback is not an overlap.
    OverlappingScopes,

    /// An asynchronous scope's result was not awaited by the next turn
    NotAwaited,

    /// A scheduler-visible update happened outside every act scope
    UpdateNotWrapped { source: String },
}

/// Payload-free tag for matching diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    InvalidReturn,
    AwaitedSyncScope,
    OverlappingScopes,
    NotAwaited,
    UpdateNotWrapped,
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::InvalidReturn { .. } => DiagnosticKind::InvalidReturn,
            Self::AwaitedSyncScope => DiagnosticKind::AwaitedSyncScope,
            Self::OverlappingScopes => DiagnosticKind::OverlappingScopes,
            Self::NotAwaited => DiagnosticKind::NotAwaited,
            Self::UpdateNotWrapped { .. } => DiagnosticKind::UpdateNotWrapped,
        }
    }

    /// The rendered message
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidReturn { returned } => write!(
                f,
                "The callback passed to act(...) must return () or a deferred result. It returned {}.",
                returned
            ),
            Self::AwaitedSyncScope => write!(
                f,
                "Do not await the result of calling act(...) with sync logic, it is not a deferred result."
            ),
            Self::OverlappingScopes => write!(
                f,
                "You seem to have overlapping act(...) calls, this is not supported. \
                 Await previous act(...) calls before making a new one."
            ),
            Self::NotAwaited => write!(
                f,
                "You called act_async(...) without awaiting its result. \
                 This can interleave multiple act(...) scopes; await act_async(...) instead."
            ),
            Self::UpdateNotWrapped { source } => write!(
                f,
                "An update to {} was not wrapped in act(...). \
                 Wrap code that causes state updates in act(...) before asserting on the output.",
                source
            ),
        }
    }
}

/// Destination for usage diagnostics
pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs every diagnostic at WARN level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!(kind = ?diagnostic.kind(), "{}", diagnostic);
    }
}

/// Collects diagnostics for later inspection
///
/// Cheap to clone; clones share the same buffer. Every diagnostic is also
/// logged at WARN level.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<Diagnostic>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Drain the buffer
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    /// Number of recorded diagnostics of `kind`
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.borrow().iter().filter(|d| d.kind() == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Rendered messages, in report order
    pub fn messages(&self) -> Vec<String> {
        self.entries.borrow().iter().map(Diagnostic::message).collect()
    }
}

impl DiagnosticSink for Recorder {
    fn report(&self, diagnostic: Diagnostic) {
        TracingSink.report(diagnostic.clone());
        self.entries.borrow_mut().push(diagnostic);
    }
}
