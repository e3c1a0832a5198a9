//! Cancellation handler pair and the registration handle given to routines.

use std::fmt;
use std::rc::{Rc, Weak};

use super::RunState;

/// Called when a run is torn down while still in flight.
pub type OnCancel = Box<dyn FnOnce()>;

/// Called with the rejection reason when a wait rejects after cancellation.
pub type OnCancelError = Box<dyn FnOnce(anyhow::Error)>;

fn noop() {}

fn noop_error(_: anyhow::Error) {}

/// The single active pair of cancellation handlers for a run.
///
/// Both slots default to an inert no-op.
pub struct CancelHandlers {
    on_cancel: OnCancel,
    on_cancel_error: OnCancelError,
    catches_errors: bool,
}

impl CancelHandlers {
    /// Creates a pair of no-op handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation handler.
    #[must_use]
    pub fn on_cancel(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_cancel = Box::new(f);
        self
    }

    /// Sets the cancellation-error handler.
    #[must_use]
    pub fn on_cancel_error(mut self, f: impl FnOnce(anyhow::Error) + 'static) -> Self {
        self.on_cancel_error = Box::new(f);
        self.catches_errors = true;
        self
    }

    /// Returns true if a cancellation-error handler has been set.
    #[must_use]
    pub const fn catches_errors(&self) -> bool {
        self.catches_errors
    }

    /// Takes the cancellation handler, leaving a no-op in its place.
    pub(crate) fn take_on_cancel(&mut self) -> OnCancel {
        std::mem::replace(&mut self.on_cancel, Box::new(noop))
    }

    /// Takes the cancellation-error handler, leaving a no-op in its place.
    pub(crate) fn take_on_cancel_error(&mut self) -> OnCancelError {
        self.catches_errors = false;
        std::mem::replace(&mut self.on_cancel_error, Box::new(noop_error))
    }
}

impl Default for CancelHandlers {
    fn default() -> Self {
        Self {
            on_cancel: Box::new(noop),
            on_cancel_error: Box::new(noop_error),
            catches_errors: false,
        }
    }
}

impl fmt::Debug for CancelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandlers")
            .field("catches_errors", &self.catches_errors)
            .finish_non_exhaustive()
    }
}

/// Handle through which a routine registers its cancellation handlers.
///
/// Every registration replaces the previous pair. The pair is reset to no-op
/// after each step that completes without cancellation, so a registration only
/// covers the suspension it was made before.
///
/// The handle does not keep its run alive; registering after the run is gone
/// does nothing.
#[derive(Clone)]
pub struct CancelRegistrar {
    run: Weak<RunState>,
}

impl CancelRegistrar {
    pub(crate) fn new(run: &Rc<RunState>) -> Self {
        Self {
            run: Rc::downgrade(run),
        }
    }

    /// Replaces the active handler pair.
    pub fn set(&self, handlers: CancelHandlers) {
        if let Some(run) = self.run.upgrade() {
            run.set_handlers(handlers);
        }
    }

    /// Registers a cancellation handler with no error handler.
    pub fn on_cancel(&self, f: impl FnOnce() + 'static) {
        self.set(CancelHandlers::new().on_cancel(f));
    }

    /// Registers a cancellation handler and a cancellation-error handler.
    pub fn on_cancel_or_error(
        &self,
        on_cancel: impl FnOnce() + 'static,
        on_cancel_error: impl FnOnce(anyhow::Error) + 'static,
    ) {
        self.set(
            CancelHandlers::new()
                .on_cancel(on_cancel)
                .on_cancel_error(on_cancel_error),
        );
    }

    /// Resets both handlers to no-op.
    pub fn clear(&self) {
        self.set(CancelHandlers::new());
    }

    /// Returns true once the run this handle belongs to has been canceled or
    /// dropped.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.run.upgrade().map_or(true, |run| run.is_canceled())
    }
}

impl fmt::Debug for CancelRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRegistrar")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
