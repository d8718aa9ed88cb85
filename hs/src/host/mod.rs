//! Deterministic host loop
//!
//! Single-threaded, with explicit microtask and macrotask queues and a
//! virtual clock, so scheduling-order tests replay exactly.

mod config;
mod core;
mod queue;

pub use self::core::{Host, HostError, NextTurn, Sleep};
pub use config::HostConfig;
pub use queue::{HostStats, TaskId};
