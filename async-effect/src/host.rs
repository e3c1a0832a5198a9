//! Lifecycle primitives consumed from the host component model.
//!
//! [`EffectCell`] is the minimal "run this when the dependencies change, run
//! its teardown before the next run and on removal" contract the binding is
//! built on. Dependency comparison is the dependency type's `PartialEq`; a unit
//! `()` dependency runs once and never restarts.

use std::fmt;

/// A teardown returned by an effect initializer.
pub struct Teardown(Box<dyn FnOnce()>);

impl Teardown {
    /// Wraps a closure.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A teardown that does nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::new(|| {})
    }

    /// Runs the teardown, consuming it.
    pub fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown")
    }
}

/// A dependency-tracked effect slot owned by one component instance.
pub struct EffectCell<D> {
    deps: Option<D>,
    teardown: Option<Teardown>,
    removed: bool,
}

impl<D> EffectCell<D> {
    /// Creates an effect slot that has never run.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deps: None,
            teardown: None,
            removed: false,
        }
    }

    /// Permanently removes the effect, running the current teardown.
    pub fn remove(&mut self) {
        self.removed = true;
        if let Some(teardown) = self.teardown.take() {
            teardown.run();
        }
    }

    /// Returns true once [`remove`](Self::remove) has been called.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns the dependencies of the last run.
    #[must_use]
    pub const fn deps(&self) -> Option<&D> {
        self.deps.as_ref()
    }
}

impl<D: PartialEq> EffectCell<D> {
    /// Runs `init` if this is the first update or `deps` differs from the
    /// previous update's, after running the previous teardown.
    ///
    /// Returns whether `init` ran. Does nothing once removed.
    pub fn update(&mut self, deps: D, init: impl FnOnce() -> Teardown) -> bool {
        if self.removed || self.deps.as_ref() == Some(&deps) {
            return false;
        }
        if let Some(teardown) = self.teardown.take() {
            teardown.run();
        }
        self.deps = Some(deps);
        self.teardown = Some(init());
        true
    }
}

impl<D> Default for EffectCell<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: fmt::Debug> fmt::Debug for EffectCell<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCell")
            .field("deps", &self.deps)
            .field("active", &self.teardown.is_some())
            .field("removed", &self.removed)
            .finish()
    }
}
