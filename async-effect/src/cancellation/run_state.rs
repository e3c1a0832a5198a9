//! Per-run state shared by a binding and its driver loop.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::handlers::{CancelHandlers, OnCancelError};
use crate::routine::Cleanup;

/// Lifecycle phase of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// The routine has been constructed but not resumed yet.
    #[default]
    Created,
    /// The driver loop is advancing the routine.
    Running,
    /// The routine finished and left a cleanup action.
    CompletedWithCleanup,
    /// The routine finished without a cleanup action.
    CompletedWithoutCleanup,
    /// The routine failed and the loop stopped.
    AbortedOnError,
    /// The run was torn down while in flight.
    Canceled,
}

impl RunPhase {
    /// Returns true for phases no run ever leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::CompletedWithCleanup => write!(f, "completed_with_cleanup"),
            Self::CompletedWithoutCleanup => write!(f, "completed_without_cleanup"),
            Self::AbortedOnError => write!(f, "aborted_on_error"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// The mutable record of one run.
///
/// Owned through an `Rc` by the binding's teardown and by the driver loop.
/// Single-threaded; never shared across tasks that run concurrently.
pub struct RunState {
    id: Uuid,
    canceled: Cell<bool>,
    phase: Cell<RunPhase>,
    handlers: RefCell<CancelHandlers>,
    cleanup: RefCell<Option<Cleanup>>,
    release: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl RunState {
    /// Creates fresh state: not canceled, no-op handlers, no cleanup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            canceled: Cell::new(false),
            phase: Cell::new(RunPhase::Created),
            handlers: RefCell::new(CancelHandlers::default()),
            cleanup: RefCell::new(None),
            release: RefCell::new(None),
        }
    }

    /// Returns the run identifier used in log fields.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    /// Returns whether the run has been torn down.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }

    /// Returns whether a cleanup action is waiting for teardown.
    #[must_use]
    pub fn has_cleanup(&self) -> bool {
        self.cleanup.borrow().is_some()
    }

    fn transition(&self, to: RunPhase) -> bool {
        let from = self.phase.get();
        if from.is_terminal() {
            return false;
        }
        self.phase.set(to);
        debug!(run_id = %self.id, %from, %to, "Run phase changed");
        true
    }

    pub(crate) fn begin(&self) {
        if self.phase.get() == RunPhase::Created {
            self.transition(RunPhase::Running);
        }
    }

    pub(crate) fn set_handlers(&self, handlers: CancelHandlers) {
        let previous = self.handlers.replace(handlers);
        drop(previous);
    }

    pub(crate) fn clear_handlers(&self) {
        self.set_handlers(CancelHandlers::default());
    }

    /// Records normal completion. Ignored once the run has been canceled.
    pub(crate) fn complete(&self, cleanup: Option<Cleanup>) {
        if self.is_canceled() {
            return;
        }
        let phase = if cleanup.is_some() {
            RunPhase::CompletedWithCleanup
        } else {
            RunPhase::CompletedWithoutCleanup
        };
        if self.transition(phase) {
            self.clear_handlers();
            *self.cleanup.borrow_mut() = cleanup;
        }
    }

    /// Records an unhandled failure. The handler pair is dropped since the run
    /// is no longer in flight.
    pub(crate) fn abort(&self) {
        if self.transition(RunPhase::AbortedOnError) {
            self.clear_handlers();
        }
    }

    /// Registers what teardown drops once the run is over, replacing any
    /// earlier registration.
    pub(crate) fn on_release(&self, release: impl FnOnce() + 'static) {
        *self.release.borrow_mut() = Some(Box::new(release));
    }

    /// Takes the cancellation-error handler if one was registered.
    pub(crate) fn take_cancel_error_handler(&self) -> Option<OnCancelError> {
        let mut handlers = self.handlers.borrow_mut();
        handlers
            .catches_errors()
            .then(|| handlers.take_on_cancel_error())
    }

    /// Ends the run: marks it canceled, fires the registered cancellation
    /// handler, then the recorded cleanup, then releases the routine. Runs at
    /// most once.
    pub fn teardown(&self) {
        if self.canceled.replace(true) {
            return;
        }
        self.transition(RunPhase::Canceled);
        debug!(run_id = %self.id, phase = %self.phase(), "Tearing down run");

        let on_cancel = self.handlers.borrow_mut().take_on_cancel();
        on_cancel();

        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }

        let release = self.release.borrow_mut().take();
        if let Some(release) = release {
            release();
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("id", &self.id)
            .field("canceled", &self.is_canceled())
            .field("phase", &self.phase())
            .field("has_cleanup", &self.has_cleanup())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_new_state() {
        let run = RunState::new();
        assert!(!run.is_canceled());
        assert_eq!(run.phase(), RunPhase::Created);
        assert!(!run.has_cleanup());
    }

    #[test]
    fn test_teardown_while_running_fires_handler() {
        let run = RunState::new();
        run.begin();

        let hits = counter();
        let h = hits.clone();
        run.set_handlers(CancelHandlers::new().on_cancel(move || h.set(h.get() + 1)));

        run.teardown();
        run.teardown();

        assert_eq!(hits.get(), 1);
        assert!(run.is_canceled());
        assert_eq!(run.phase(), RunPhase::Canceled);
    }

    #[test]
    fn test_completion_clears_handlers_and_keeps_cleanup() {
        let run = RunState::new();
        run.begin();

        let cancels = counter();
        let c = cancels.clone();
        run.set_handlers(CancelHandlers::new().on_cancel(move || c.set(c.get() + 1)));

        let cleanups = counter();
        let c = cleanups.clone();
        run.complete(Some(Cleanup::new(move || c.set(c.get() + 1))));
        assert_eq!(run.phase(), RunPhase::CompletedWithCleanup);

        run.teardown();
        run.teardown();

        assert_eq!(cancels.get(), 0);
        assert_eq!(cleanups.get(), 1);
        assert_eq!(run.phase(), RunPhase::CompletedWithCleanup);
    }

    #[test]
    fn test_complete_after_cancel_is_ignored() {
        let run = RunState::new();
        run.begin();
        run.teardown();

        run.complete(Some(Cleanup::new(|| panic!("must not be stored"))));
        assert!(!run.has_cleanup());
        assert_eq!(run.phase(), RunPhase::Canceled);
    }

    #[test]
    fn test_abort_drops_handlers() {
        let run = RunState::new();
        run.begin();
        run.set_handlers(CancelHandlers::new().on_cancel(|| panic!("aborted runs are not in flight")));

        run.abort();
        assert_eq!(run.phase(), RunPhase::AbortedOnError);

        run.teardown();
        assert_eq!(run.phase(), RunPhase::AbortedOnError);
    }

    #[test]
    fn test_error_handler_survives_teardown() {
        let run = RunState::new();
        run.begin();

        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        run.set_handlers(
            CancelHandlers::new().on_cancel_error(move |err| *s.borrow_mut() = Some(err.to_string())),
        );

        run.teardown();
        let handler = run.take_cancel_error_handler().expect("handler registered");
        handler(anyhow::anyhow!("late"));
        assert!(run.take_cancel_error_handler().is_none());

        assert_eq!(seen.borrow().as_deref(), Some("late"));
    }

    #[test]
    fn test_teardown_releases_after_cleanup() {
        let run = RunState::new();
        run.begin();

        let order = Rc::new(RefCell::new(Vec::new()));
        let o = order.clone();
        run.set_handlers(CancelHandlers::new().on_cancel(move || o.borrow_mut().push("cancel")));
        let o = order.clone();
        run.on_release(move || o.borrow_mut().push("release"));

        run.teardown();
        run.teardown();

        assert_eq!(*order.borrow(), vec!["cancel", "release"]);
    }

    #[test]
    fn test_phase_display_and_terminal() {
        assert_eq!(RunPhase::default(), RunPhase::Created);
        assert_eq!(RunPhase::AbortedOnError.to_string(), "aborted_on_error");
        assert!(!RunPhase::Running.is_terminal());
        assert!(RunPhase::Canceled.is_terminal());
        assert_eq!(
            serde_json::to_string(&RunPhase::CompletedWithCleanup).unwrap(),
            "\"completed_with_cleanup\""
        );
    }
}
