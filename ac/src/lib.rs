//! ActCoord - act coordinator for batching schedulers
//!
//! Tests that drive a batching update scheduler cannot tell when the work
//! they triggered (render passes, deferred effects, continuations resumed
//! on later turns) has settled. The coordinator runs a callback in an act
//! scope and drains the scheduler until nothing is pending, so assertions
//! that follow see the final state.
//!
//! # Core Concepts
//!
//! - **Fixed point**: a flush repeats render work and deferred effects until
//!   a pass runs nothing
//! - **Scopes nest**: nested invocations fold into the outermost scope,
//!   which alone decides the mode and captures the tracing context
//! - **Misuse is reported, not raised**: usage diagnostics never change
//!   control flow
//!
//! # Modules
//!
//! - [`coordinator`] - entry point and invocation handles
//! - [`flush`] - fixed-point and multi-turn flushing
//! - [`state`] - scope depth, mode and async bookkeeping
//! - [`diagnostics`] - usage warnings and sinks
//! - [`surface`], [`host`], [`interaction`] - consumed boundaries
//! - [`config`] - configuration types and loading

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod flush;
pub mod host;
pub mod interaction;
pub mod outcome;
pub mod state;
pub mod surface;

// Re-export commonly used types
pub use config::ActConfig;
pub use coordinator::{Act, AsyncAct, Coordinator, CoordinatorBuilder, SyncAct};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Recorder, TracingSink};
pub use error::ActError;
pub use flush::FlushEngine;
pub use host::{HostLoop, TokioHost, YieldTurn};
pub use interaction::{ContextHandle, InteractionTracer, NoopTracer, Traced};
pub use outcome::{ActReturn, AsyncOutcome, CallbackOutcome, Deferred};
pub use state::{CoordinatorState, ScopeGuard, ScopeMode, StateSnapshot};
pub use surface::{SchedulerSurface, UpdateHook};
