//! HostSched - deterministic host and batching scheduler
//!
//! A reference host for the act coordinator: a single-threaded event loop
//! with explicit microtask and macrotask queues and a virtual clock, a
//! scheduler that batches state updates into commits, and an interaction
//! tracker. The `hs` binary runs built-in scenarios against them.
//!
//! # Modules
//!
//! - [`host`] - turn-based event loop implementing `HostLoop`
//! - [`scheduler`] - batching scheduler implementing `SchedulerSurface`
//! - [`interaction`] - interaction tracking implementing `InteractionTracer`
//! - [`harness`] - everything wired to one coordinator
//! - [`scenario`] - built-in end-to-end checks
//! - [`cli`] - command line definitions

pub mod cli;
pub mod harness;
pub mod host;
pub mod interaction;
pub mod scenario;
pub mod scheduler;

pub use harness::Harness;
pub use host::{Host, HostConfig, HostError};
pub use interaction::{Interaction, Interactions};
pub use scenario::{Scenario, ScenarioReport};
pub use scheduler::{BatchScheduler, CellId, CommitRecord, EffectRecord, StateCell};
