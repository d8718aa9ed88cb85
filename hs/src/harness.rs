//! A coordinator wired to the deterministic host

use std::rc::Rc;

use actcoord::{ActConfig, Coordinator, DiagnosticKind, Recorder};
use tracing::debug;

use crate::host::{Host, HostConfig};
use crate::interaction::Interactions;
use crate::scheduler::BatchScheduler;

/// Host, scheduler, tracer and coordinator sharing one loop
///
/// Diagnostics go to `recorder` (which also logs them).
pub struct Harness {
    pub host: Host,
    pub interactions: Interactions,
    pub scheduler: BatchScheduler,
    pub recorder: Recorder,
    pub coordinator: Rc<Coordinator>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(ActConfig::default())
    }
}

impl Harness {
    pub fn new(config: ActConfig) -> Self {
        Self::with_host_config(config, HostConfig::default())
    }

    pub fn with_host_config(config: ActConfig, host_config: HostConfig) -> Self {
        debug!(?config, ?host_config, "Harness::with_host_config: called");
        let host = Host::new(host_config);
        let interactions = Interactions::new();
        let scheduler = BatchScheduler::new(interactions.clone());
        let recorder = Recorder::new();

        let coordinator = Coordinator::builder(Rc::new(scheduler.clone()), Rc::new(host.clone()))
            .with_tracer(Rc::new(interactions.clone()))
            .with_diagnostics(Rc::new(recorder.clone()))
            .with_config(config)
            .build();

        Self {
            host,
            interactions,
            scheduler,
            recorder,
            coordinator: Rc::new(coordinator),
        }
    }

    /// Shorthand for `recorder.count(kind)`
    pub fn warnings(&self, kind: DiagnosticKind) -> usize {
        self.recorder.count(kind)
    }
}
