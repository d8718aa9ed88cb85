//! Batching scheduler
//!
//! State cells queue updates; a render pass applies the queue as one
//! commit and schedules the effects that depend on what changed.

mod cell;
mod core;
mod queue;

pub use self::core::BatchScheduler;
pub use cell::StateCell;
pub use queue::{CellId, CommitRecord, EffectRecord, SchedulerStats};
