//! Act coordinator
//!
//! The coordinator wraps a callback in an act scope and guarantees that all
//! scheduler work the callback caused has run before it returns (sync
//! scopes) or settles (async scopes):
//! - **Sync:** run the callback, flush to a fixed point, return
//! - **Async:** await the callback, then flush once per host turn until a
//!   turn finds nothing new

mod core;
mod handle;

pub use self::core::{Coordinator, CoordinatorBuilder};
pub use handle::{Act, AsyncAct, SyncAct};
