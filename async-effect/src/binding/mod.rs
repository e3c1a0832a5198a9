//! Binding of routines to a component's lifecycle.
//!
//! An [`AsyncEffect`] lives in a component instance's storage. The component
//! calls [`AsyncEffect::render`] on every render with the current routine
//! factory and dependency value:
//!
//! - the factory is stored, so the latest closure is the one a new run uses;
//! - when the dependencies differ from the previous render (or on the first
//!   render) the previous run is torn down and a new one is started;
//! - [`AsyncEffect::unmount`], or dropping the binding, tears down the current
//!   run for good.
//!
//! ```rust,ignore
//! let mut effect = AsyncEffect::new(pool.spawner());
//! effect.render(
//!     move |registrar| {
//!         Steps::new().then(move |_| {
//!             registrar.on_cancel(|| request.abort());
//!             Ok(Step::await_result(fetch_user(id)))
//!         })
//!     },
//!     id,
//! );
//! ```


use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancellation::{CancelRegistrar, RunPhase, RunState};
use crate::config::EffectConfig;
use crate::diagnostics::{DiagnosticSink, TracingDiagnosticSink};
use crate::driver::{Driver, TaskSpawner};
use crate::host::{EffectCell, Teardown};
use crate::routine::Routine;

/// A stored routine factory.
pub type RoutineFactory<V> = Box<dyn FnMut(CancelRegistrar) -> Box<dyn Routine<Value = V>>>;

/// Ties one routine run at a time to a component's lifecycle.
///
/// `D` is the dependency value compared between renders; `V` is the type of
/// values the routines pass across suspension points.
pub struct AsyncEffect<D, V> {
    factory: Option<RoutineFactory<V>>,
    effect: EffectCell<D>,
    current: Option<Rc<RunState>>,
    runs: u64,
    spawner: Rc<dyn TaskSpawner>,
    sink: Arc<dyn DiagnosticSink>,
    config: Rc<EffectConfig>,
}

impl<D, V> AsyncEffect<D, V> {
    /// Creates an unmounted binding that schedules continuations on `spawner`
    /// and reports through a [`TracingDiagnosticSink`].
    pub fn new(spawner: impl TaskSpawner + 'static) -> Self {
        Self {
            factory: None,
            effect: EffectCell::new(),
            current: None,
            runs: 0,
            spawner: Rc::new(spawner),
            sink: Arc::new(TracingDiagnosticSink),
            config: Rc::new(EffectConfig::default()),
        }
    }

    /// Sets the diagnostic sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EffectConfig) -> Self {
        self.config = Rc::new(config);
        self
    }

    /// Tears down the current run permanently. Later renders start nothing.
    pub fn unmount(&mut self) {
        if self.effect.is_removed() {
            return;
        }
        debug!(runs = self.runs, "Unmounting async effect");
        self.effect.remove();
        self.factory = None;
    }

    /// Returns true until [`unmount`](Self::unmount) is called.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        !self.effect.is_removed()
    }

    /// Returns the phase of the most recent run.
    #[must_use]
    pub fn phase(&self) -> Option<RunPhase> {
        self.current.as_ref().map(|run| run.phase())
    }

    /// Returns the identifier of the most recent run.
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(|run| run.id())
    }

    /// Returns how many runs have been started.
    #[must_use]
    pub const fn run_count(&self) -> u64 {
        self.runs
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &EffectConfig {
        &self.config
    }
}

impl<D: PartialEq, V: 'static> AsyncEffect<D, V> {
    /// Records `factory` as the latest routine factory and, when `deps`
    /// changed since the previous render, replaces the current run with a new
    /// one built by it.
    ///
    /// The new run executes up to its first awaitable before this returns.
    /// A panic from `factory` itself propagates to the caller.
    pub fn render<F, R>(&mut self, mut factory: F, deps: D)
    where
        F: FnMut(CancelRegistrar) -> R + 'static,
        R: Routine<Value = V> + 'static,
    {
        if self.effect.is_removed() {
            warn!("Render after unmount ignored");
            return;
        }

        let factory = self.factory.insert(Box::new(
            move |registrar: CancelRegistrar| -> Box<dyn Routine<Value = V>> {
                Box::new(factory(registrar))
            },
        ));
        let spawner = &self.spawner;
        let sink = &self.sink;
        let config = &self.config;
        let current = &mut self.current;
        let runs = &mut self.runs;

        self.effect.update(deps, || {
            let run = Rc::new(RunState::new());
            *current = Some(Rc::clone(&run));
            *runs += 1;
            debug!(run_id = %run.id(), runs = *runs, "Dependencies changed; starting run");

            let routine = factory(CancelRegistrar::new(&run));
            Driver::new(
                routine,
                Rc::clone(&run),
                Rc::clone(spawner),
                Arc::clone(sink),
                Rc::clone(config),
            )
            .start();

            Teardown::new(move || run.teardown())
        });
    }
}

impl<D, V> Drop for AsyncEffect<D, V> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<D: fmt::Debug, V> fmt::Debug for AsyncEffect<D, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEffect")
            .field("effect", &self.effect)
            .field("current", &self.current)
            .field("runs", &self.runs)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
