//! Coordinator scope state
//!
//! One [`CoordinatorState`] is shared by every invocation made through the
//! same coordinator. All mutation of depth and mode goes through
//! [`ScopeGuard`], so depth stays balanced on every exit path.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::interaction::ContextHandle;

/// Mode of the current outermost scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    #[default]
    None,
    Sync,
    Async,
}

/// Shared scope bookkeeping
#[derive(Debug, Default)]
pub struct CoordinatorState {
    depth: Cell<usize>,
    mode: Cell<ScopeMode>,
    draining: Cell<usize>,
    outstanding_async: Cell<usize>,
    overlap_reported: Cell<bool>,
    context: RefCell<ContextHandle>,
}

/// Point-in-time copy of [`CoordinatorState`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub depth: usize,
    pub mode: ScopeMode,
    pub async_drain_in_flight: bool,
    pub outstanding_async: usize,
}

impl StateSnapshot {
    /// No scope open and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.depth == 0 && self.mode == ScopeMode::None && !self.async_drain_in_flight && self.outstanding_async == 0
    }
}

impl CoordinatorState {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode.get()
    }

    /// Is any act scope active?
    pub fn is_acting(&self) -> bool {
        self.depth.get() > 0
    }

    /// Has any asynchronous scope's callback settled with its drain still running?
    pub fn async_drain_in_flight(&self) -> bool {
        self.draining.get() > 0
    }

    pub fn outstanding_async(&self) -> usize {
        self.outstanding_async.get()
    }

    /// Context captured by the outermost scope
    pub fn context(&self) -> ContextHandle {
        self.context.borrow().clone()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            depth: self.depth.get(),
            mode: self.mode.get(),
            async_drain_in_flight: self.async_drain_in_flight(),
            outstanding_async: self.outstanding_async.get(),
        }
    }

    /// Mark an asynchronous scope as started
    ///
    /// Returns true when another scope is already draining and no overlap
    /// has been reported since the coordinator last had no asynchronous
    /// scopes open. A scope started from inside another scope's callback
    /// does not count: that callback has not settled yet.
    pub(crate) fn begin_async(&self) -> bool {
        self.outstanding_async.set(self.outstanding_async.get() + 1);
        let overlapping = self.draining.get() > 0;
        let report = overlapping && !self.overlap_reported.replace(true);
        debug!(
            overlapping,
            report,
            outstanding = self.outstanding_async.get(),
            "CoordinatorState::begin_async: called"
        );
        report
    }

    /// Mark an asynchronous scope's callback as settled; its drain starts
    pub(crate) fn enter_drain(&self) {
        self.draining.set(self.draining.get() + 1);
        debug!(draining = self.draining.get(), "CoordinatorState::enter_drain: called");
    }

    /// Mark an asynchronous scope as settled
    ///
    /// `drained` says whether the scope reached [`enter_drain`](Self::enter_drain).
    pub(crate) fn end_async(&self, drained: bool) {
        if drained {
            self.draining.set(self.draining.get().saturating_sub(1));
        }
        let outstanding = self.outstanding_async.get().saturating_sub(1);
        self.outstanding_async.set(outstanding);
        if outstanding == 0 {
            self.overlap_reported.set(false);
        }
        debug!(outstanding, "CoordinatorState::end_async: called");
    }

    /// Upgrade the outermost scope's mode once its callback revealed it
    pub(crate) fn promote(&self, mode: ScopeMode) {
        if self.depth.get() == 1 {
            self.mode.set(mode);
        }
    }
}

/// Depth-counted scope guard
///
/// Entering increments depth. The outermost entry captures the tracing
/// context and sets the mode. Dropping decrements depth, and the transition
/// to zero resets mode and context.
#[derive(Debug)]
#[must_use]
pub struct ScopeGuard {
    state: Rc<CoordinatorState>,
}

impl ScopeGuard {
    pub fn enter(state: &Rc<CoordinatorState>, mode: ScopeMode, capture: impl FnOnce() -> ContextHandle) -> Self {
        let depth = state.depth.get() + 1;
        state.depth.set(depth);
        if depth == 1 {
            state.mode.set(mode);
            *state.context.borrow_mut() = capture();
        }
        debug!(depth, ?mode, "ScopeGuard::enter: called");
        Self { state: state.clone() }
    }

    /// Was this the outermost entry?
    pub fn is_outermost(&self) -> bool {
        self.state.depth.get() == 1
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let depth = self.state.depth.get().saturating_sub(1);
        self.state.depth.set(depth);
        if depth == 0 {
            self.state.mode.set(ScopeMode::None);
            *self.state.context.borrow_mut() = ContextHandle::none();
        }
        debug!(depth, "ScopeGuard::drop: called");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outermost_sets_mode_and_context() {
        let state = CoordinatorState::new();
        {
            let guard = ScopeGuard::enter(&state, ScopeMode::Sync, || ContextHandle::new(1u32));
            assert!(guard.is_outermost());
            assert_eq!(state.mode(), ScopeMode::Sync);
            assert_eq!(state.context().downcast_ref::<u32>(), Some(&1));
        }
        assert_eq!(state.depth(), 0);
        assert_eq!(state.mode(), ScopeMode::None);
        assert!(state.context().is_none());
    }

    #[test]
    fn test_nested_entry_keeps_outer_scope() {
        let state = CoordinatorState::new();
        let outer = ScopeGuard::enter(&state, ScopeMode::Async, || ContextHandle::new("outer"));
        {
            let inner = ScopeGuard::enter(&state, ScopeMode::Sync, || panic!("nested scopes must not capture"));
            assert!(!inner.is_outermost());
            assert_eq!(state.depth(), 2);
            assert_eq!(state.mode(), ScopeMode::Async);
        }
        assert_eq!(state.depth(), 1);
        assert_eq!(state.mode(), ScopeMode::Async);
        drop(outer);
        assert!(state.snapshot().is_idle());
    }

    #[test]
    fn test_depth_balanced_on_panic() {
        let state = CoordinatorState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ScopeGuard::enter(&state, ScopeMode::Sync, ContextHandle::none);
            panic!("callback panicked");
        }));
        assert!(result.is_err());
        assert_eq!(state.depth(), 0);
        assert_eq!(state.mode(), ScopeMode::None);
    }

    #[test]
    fn test_async_bookkeeping_reports_overlap() {
        let state = CoordinatorState::new();
        assert!(!state.begin_async());
        state.enter_drain();
        assert!(state.async_drain_in_flight());
        assert!(state.begin_async());
        assert_eq!(state.outstanding_async(), 2);

        state.end_async(true);
        assert!(!state.async_drain_in_flight());
        assert_eq!(state.outstanding_async(), 1);

        state.end_async(false);
        assert_eq!(state.outstanding_async(), 0);
        assert!(state.snapshot().is_idle());
    }

    #[test]
    fn test_scope_started_inside_open_callback_is_not_overlap() {
        let state = CoordinatorState::new();
        assert!(!state.begin_async());
        // the outer callback has not settled, so nothing is draining yet
        assert!(!state.begin_async());
        state.enter_drain();
        state.end_async(true);
        state.enter_drain();
        state.end_async(true);
        assert_eq!(state.outstanding_async(), 0);
    }

    #[test]
    fn test_overlap_reported_once_per_episode() {
        let state = CoordinatorState::new();
        assert!(!state.begin_async());
        state.enter_drain();
        assert!(state.begin_async());
        assert!(!state.begin_async());
        assert!(!state.begin_async());
        state.end_async(true);
        for _ in 0..3 {
            state.end_async(false);
        }
        assert!(state.snapshot().is_idle());

        // a fresh overlap after everything settled is reported again
        assert!(!state.begin_async());
        state.enter_drain();
        assert!(state.begin_async());
    }

    #[test]
    fn test_promote_only_affects_outermost() {
        let state = CoordinatorState::new();
        let _outer = ScopeGuard::enter(&state, ScopeMode::Sync, ContextHandle::none);
        state.promote(ScopeMode::Async);
        assert_eq!(state.mode(), ScopeMode::Async);

        let _inner = ScopeGuard::enter(&state, ScopeMode::Sync, ContextHandle::none);
        state.promote(ScopeMode::Sync);
        assert_eq!(state.mode(), ScopeMode::Async);
    }
}
