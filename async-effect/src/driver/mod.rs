//! The cancellation-aware driver loop.
//!
//! A [`Driver`] owns one run of a [`Routine`]. It resumes the routine inline
//! for as long as it yields plain values, hands each awaitable to a
//! [`TaskSpawner`], and continues from the settled value unless the run was
//! torn down in the meantime.
//!
//! Ordering: teardown marks the run canceled and fires the cancellation
//! handler synchronously, so every continuation scheduled before it observes
//! the flag and never resumes the routine.
//!
//! The routine itself lives in a slot the run's teardown empties. A pending
//! continuation keeps only the run record alive, so a wait that never settles
//! does not pin a torn-down routine.

mod spawner;

#[cfg(test)]
pub(crate) use spawner::MockTaskSpawner;
pub use spawner::{TaskSpawner, TokioLocalSpawner};

use futures::FutureExt;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cancellation::RunState;
use crate::config::EffectConfig;
use crate::diagnostics::{DiagnosticSink, Severity};
use crate::errors::EffectError;
use crate::routine::{Awaitable, Resume, Routine, Step};

/// Holds the routine between steps. Emptied by teardown.
type RoutineSlot<V> = Rc<RefCell<Option<Box<dyn Routine<Value = V>>>>>;

/// Drives one routine to completion, failure, or cancellation.
pub struct Driver<V> {
    routine: RoutineSlot<V>,
    run: Rc<RunState>,
    spawner: Rc<dyn TaskSpawner>,
    sink: Arc<dyn DiagnosticSink>,
    config: Rc<EffectConfig>,
}

impl<V: 'static> Driver<V> {
    /// Creates a driver for a routine and the run record it reports into.
    ///
    /// Tearing the run down drops the routine, even while a continuation is
    /// still waiting on its awaitable.
    pub fn new(
        routine: Box<dyn Routine<Value = V>>,
        run: Rc<RunState>,
        spawner: Rc<dyn TaskSpawner>,
        sink: Arc<dyn DiagnosticSink>,
        config: Rc<EffectConfig>,
    ) -> Self {
        let routine: RoutineSlot<V> = Rc::new(RefCell::new(Some(routine)));
        let slot = Rc::clone(&routine);
        let run_id = run.id();
        run.on_release(move || {
            let released = slot.borrow_mut().take();
            if released.is_some() {
                trace!(%run_id, "Released routine");
            }
        });

        Self {
            routine,
            run,
            spawner,
            sink,
            config,
        }
    }

    /// Starts the run.
    ///
    /// Everything up to the first awaitable runs before this returns; a routine
    /// that never awaits has finished by then.
    pub fn start(self) {
        self.run.begin();
        debug!(run_id = %self.run.id(), "Run started");
        self.pump(Resume::Start);
    }

    fn pump(self, mut input: Resume<V>) {
        loop {
            let Some(mut routine) = self.routine.borrow_mut().take() else {
                self.halt();
                return;
            };

            let step = match self.resume(routine.as_mut(), input) {
                Ok(step) => step,
                Err(err) => {
                    self.fail(&err);
                    return;
                }
            };

            match step {
                Step::Yield(value) => {
                    if self.run.is_canceled() {
                        self.halt();
                        return;
                    }
                    self.run.clear_handlers();
                    self.restore(routine);
                    input = Resume::Value(value);
                }
                Step::Await(awaitable) => {
                    self.restore(routine);
                    self.suspend(awaitable);
                    return;
                }
                Step::Done(cleanup) => {
                    drop(routine);
                    if self.run.is_canceled() {
                        self.halt();
                        return;
                    }
                    self.run.complete(cleanup);
                    debug!(run_id = %self.run.id(), phase = %self.run.phase(), "Run completed");
                    return;
                }
            }
        }
    }

    fn resume(
        &self,
        routine: &mut dyn Routine<Value = V>,
        input: Resume<V>,
    ) -> anyhow::Result<Step<V>> {
        if !self.config.catch_panics {
            return routine.resume(input);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| routine.resume(input))) {
            Ok(result) => result,
            Err(payload) => Err(EffectError::from_panic(payload.as_ref()).into()),
        }
    }

    /// Puts the routine back for the next step unless the run ended while it
    /// was out of the slot.
    fn restore(&self, routine: Box<dyn Routine<Value = V>>) {
        if !self.run.is_canceled() {
            *self.routine.borrow_mut() = Some(routine);
        }
    }

    fn suspend(self, awaitable: Awaitable<V>) {
        trace!(run_id = %self.run.id(), "Suspended on awaitable");
        let spawner = Rc::clone(&self.spawner);
        let run = Rc::clone(&self.run);
        let sink = Arc::clone(&self.sink);
        let config = Rc::clone(&self.config);
        let routine = Rc::clone(&self.routine);

        let continuation = async move {
            let outcome = awaitable.await;
            self.settle(outcome);
        };

        if let Err(err) = spawner.spawn(continuation.boxed_local()) {
            drop(routine.borrow_mut().take());
            report_unhandled(&run, sink.as_ref(), &config, &err.into());
        }
    }

    fn settle(self, outcome: anyhow::Result<V>) {
        match outcome {
            Ok(value) => {
                if self.run.is_canceled() {
                    self.halt();
                    return;
                }
                self.run.clear_handlers();
                self.pump(Resume::Value(value));
            }
            Err(reason) if self.run.is_canceled() => self.reject_after_cancel(reason),
            Err(reason) => {
                self.run.clear_handlers();
                self.pump(Resume::Error(reason));
            }
        }
    }

    fn reject_after_cancel(&self, reason: anyhow::Error) {
        match self.run.take_cancel_error_handler() {
            Some(on_cancel_error) => {
                trace!(run_id = %self.run.id(), "Delivering rejection to cancellation-error handler");
                on_cancel_error(reason);
            }
            None if self.config.report_dropped_rejections => {
                self.sink.report(
                    Severity::Debug,
                    &self
                        .config
                        .message("Rejection after cancellation dropped; no error handler registered"),
                    Some(&reason),
                );
            }
            None => {
                trace!(run_id = %self.run.id(), "Dropped rejection after cancellation");
            }
        }
    }

    fn halt(&self) {
        trace!(run_id = %self.run.id(), "Run canceled; routine will not be resumed");
    }

    fn fail(&self, err: &anyhow::Error) {
        report_unhandled(&self.run, self.sink.as_ref(), &self.config, err);
    }
}

impl<V> fmt::Debug for Driver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("run", &self.run).finish_non_exhaustive()
    }
}

fn report_unhandled(
    run: &RunState,
    sink: &dyn DiagnosticSink,
    config: &EffectConfig,
    err: &anyhow::Error,
) {
    run.abort();
    debug!(run_id = %run.id(), phase = %run.phase(), "Run aborted");
    sink.report(
        Severity::Error,
        &config.message("Unhandled failure in routine"),
        Some(err),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancelHandlers, CancelRegistrar, RunPhase};
    use crate::diagnostics::CollectingDiagnosticSink;
    use crate::routine::{from_fn, Steps};
    use crate::testing::{deferred, Recorder};
    use anyhow::anyhow;
    use futures::executor::LocalPool;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    /// A routine that waits forever and counts live instances.
    struct Counted {
        alive: Rc<Cell<usize>>,
    }

    impl Counted {
        fn new(alive: &Rc<Cell<usize>>) -> Self {
            alive.set(alive.get() + 1);
            Self {
                alive: Rc::clone(alive),
            }
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.alive.set(self.alive.get() - 1);
        }
    }

    impl Routine for Counted {
        type Value = String;

        fn resume(&mut self, _: Resume<String>) -> anyhow::Result<Step<String>> {
            Ok(Step::await_ok(futures::future::pending()))
        }
    }

    struct Harness {
        pool: LocalPool,
        sink: Arc<CollectingDiagnosticSink>,
        config: Rc<EffectConfig>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(EffectConfig::default())
        }

        fn with_config(config: EffectConfig) -> Self {
            Self {
                pool: LocalPool::new(),
                sink: Arc::new(CollectingDiagnosticSink::new()),
                config: Rc::new(config),
            }
        }

        fn start<R>(&self, build: impl FnOnce(CancelRegistrar) -> R) -> Rc<RunState>
        where
            R: Routine<Value = String> + 'static,
        {
            let run = Rc::new(RunState::new());
            let routine = build(CancelRegistrar::new(&run));
            Driver::new(
                Box::new(routine),
                Rc::clone(&run),
                Rc::new(self.pool.spawner()),
                self.sink.clone(),
                Rc::clone(&self.config),
            )
            .start();
            run
        }

        fn flush(&mut self) {
            self.pool.run_until_stalled();
        }
    }

    #[test]
    fn test_plain_values_complete_synchronously() {
        let harness = Harness::new();
        let recorder = Recorder::new();

        let r = recorder.clone();
        let run = harness.start(|_| {
            Steps::new()
                .then(|_| Ok(Step::Yield("a".to_string())))
                .then(|input| Ok(Step::Yield(input.value().unwrap() + "b")))
                .then(move |input| {
                    r.record(input.value().unwrap());
                    Ok(Step::done())
                })
        });

        assert_eq!(recorder.calls(), vec!["ab".to_string()]);
        assert_eq!(run.phase(), RunPhase::CompletedWithoutCleanup);
    }

    #[test]
    fn test_awaited_value_resumes_after_flush() {
        let mut harness = Harness::new();
        let recorder = Recorder::new();

        let r = recorder.clone();
        let run = harness.start(|_| {
            Steps::new()
                .then(|_| Ok(Step::ready("x".to_string())))
                .then(move |input| {
                    r.record(input.value().unwrap());
                    Ok(Step::done())
                })
        });

        assert!(recorder.is_empty());
        assert_eq!(run.phase(), RunPhase::Running);

        harness.flush();
        assert_eq!(recorder.calls(), vec!["x".to_string()]);
        assert_eq!(run.phase(), RunPhase::CompletedWithoutCleanup);
    }

    #[test]
    fn test_rejection_is_catchable() {
        let mut harness = Harness::new();
        let recorder = Recorder::new();

        let r = recorder.clone();
        harness.start(|_| {
            Steps::new()
                .then(|_| Ok(Step::rejected(anyhow!("e"))))
                .then(move |input| {
                    if let Err(err) = input.into_result() {
                        r.record(err.to_string());
                    }
                    Ok(Step::done())
                })
        });
        harness.flush();

        assert_eq!(recorder.calls(), vec!["e".to_string()]);
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn test_uncaught_rejection_is_reported_once() {
        let mut harness = Harness::new();

        let run = harness.start(|_| {
            Steps::new()
                .then(|_| Ok(Step::rejected(anyhow!("Something went wrong."))))
                .then(|input| {
                    input.into_result()?;
                    panic!("should have propagated");
                })
        });
        harness.flush();

        let errors = harness.sink.of_severity(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "[async-effect] Unhandled failure in routine");
        assert_eq!(errors[0].error.as_deref(), Some("Something went wrong."));
        assert_eq!(run.phase(), RunPhase::AbortedOnError);
        assert!(!run.has_cleanup());
    }

    #[test]
    fn test_synchronous_failure_aborts() {
        let harness = Harness::new();
        let run = harness.start(|_| from_fn(|_: Resume<String>| Err(anyhow!("sync"))));

        assert_eq!(run.phase(), RunPhase::AbortedOnError);
        assert_eq!(harness.sink.len(), 1);
    }

    #[test]
    fn test_panic_is_reported_as_unhandled() {
        let harness = Harness::new();
        let run = harness.start(|_| from_fn(|_: Resume<String>| -> anyhow::Result<Step<String>> {
            panic!("kaboom")
        }));

        assert_eq!(run.phase(), RunPhase::AbortedOnError);
        assert_eq!(
            harness.sink.diagnostics()[0].error.as_deref(),
            Some("Routine panicked: kaboom")
        );
    }

    #[test]
    fn test_panic_unwinds_when_not_caught() {
        let harness = Harness::with_config(EffectConfig::default().with_catch_panics(false));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            harness.start(|_| {
                from_fn(|_: Resume<String>| -> anyhow::Result<Step<String>> { panic!("kaboom") })
            })
        }));

        let payload = result.expect_err("panic should propagate");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"kaboom"));
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn test_teardown_drops_waiting_routine() {
        let mut harness = Harness::new();
        let alive = Rc::new(Cell::new(0));

        let run = harness.start(|_| Counted::new(&alive));
        harness.flush();
        assert_eq!(alive.get(), 1);

        run.teardown();
        assert_eq!(alive.get(), 0);

        harness.flush();
        assert_eq!(alive.get(), 0);
    }

    #[test]
    fn test_finished_routine_is_dropped() {
        let harness = Harness::new();
        let alive = Rc::new(Cell::new(0));

        let a = alive.clone();
        let run = harness.start(move |_| {
            let counted = Counted::new(&a);
            from_fn(move |_: Resume<String>| {
                let _ = &counted;
                Ok(Step::done())
            })
        });

        assert_eq!(run.phase(), RunPhase::CompletedWithoutCleanup);
        assert_eq!(alive.get(), 0);
    }

    #[test]
    fn test_cancel_while_pending_never_resumes() {
        let mut harness = Harness::new();
        let recorder = Recorder::new();
        let (awaitable, settle) = deferred::<String>();

        let r1 = recorder.clone();
        let r2 = recorder.clone();
        let run = harness.start(move |registrar| {
            Steps::new()
                .then(move |_| {
                    registrar.on_cancel(move || r1.record("cancel"));
                    Ok(Step::Await(awaitable))
                })
                .then(move |_| {
                    r2.record("resumed");
                    Ok(Step::done())
                })
        });

        run.teardown();
        assert_eq!(recorder.calls(), vec!["cancel".to_string()]);

        settle.resolve("late".to_string());
        harness.flush();

        assert_eq!(recorder.calls(), vec!["cancel".to_string()]);
        assert_eq!(run.phase(), RunPhase::Canceled);
    }

    #[test]
    fn test_rejection_after_cancel_reaches_error_handler() {
        let mut harness = Harness::new();
        let recorder = Recorder::new();
        let (awaitable, settle) = deferred::<String>();

        let r = recorder.clone();
        let run = harness.start(move |registrar| {
            Steps::new().then(move |_| {
                registrar.set(
                    CancelHandlers::new().on_cancel_error(move |err| r.record(err.to_string())),
                );
                Ok(Step::Await(awaitable))
            })
        });

        run.teardown();
        settle.reject(anyhow!("lel"));
        harness.flush();

        assert_eq!(recorder.calls(), vec!["lel".to_string()]);
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn test_dropped_rejection_is_reported_when_configured() {
        let mut harness =
            Harness::with_config(EffectConfig::default().with_report_dropped_rejections(true));
        let (awaitable, settle) = deferred::<String>();

        let run = harness.start(move |_| Steps::new().then(move |_| Ok(Step::Await(awaitable))));
        run.teardown();
        settle.reject(anyhow!("ignored"));
        harness.flush();

        let debug = harness.sink.of_severity(Severity::Debug);
        assert_eq!(debug.len(), 1);
        assert_eq!(debug[0].error.as_deref(), Some("ignored"));
    }

    #[test]
    fn test_handlers_reset_after_each_step() {
        let mut harness = Harness::new();
        let recorder = Recorder::new();
        let (second, _settle) = deferred::<String>();

        let r = recorder.clone();
        let run = harness.start(move |registrar| {
            Steps::new()
                .then(move |_| {
                    registrar.on_cancel(move || r.record("stale"));
                    Ok(Step::ready("first".to_string()))
                })
                .then(move |_| Ok(Step::Await(second)))
        });
        harness.flush();

        run.teardown();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_refused_spawn_aborts_run() {
        let sink = Arc::new(CollectingDiagnosticSink::new());
        let mut spawner = MockTaskSpawner::new();
        spawner
            .expect_spawn()
            .times(1)
            .returning(|_| Err(EffectError::spawn("shut down")));

        let run = Rc::new(RunState::new());
        let routine = Steps::new().then(|_| Ok(Step::ready("x".to_string())));
        Driver::new(
            Box::new(routine),
            Rc::clone(&run),
            Rc::new(spawner),
            sink.clone(),
            Rc::new(EffectConfig::default()),
        )
        .start();

        assert_eq!(run.phase(), RunPhase::AbortedOnError);
        assert_eq!(
            sink.diagnostics()[0].error.as_deref(),
            Some("Failed to schedule continuation: shut down")
        );
    }

    #[test]
    fn test_refused_spawn_drops_routine() {
        let alive = Rc::new(Cell::new(0));
        let mut spawner = MockTaskSpawner::new();
        spawner
            .expect_spawn()
            .returning(|_| Err(EffectError::spawn("shut down")));

        let run = Rc::new(RunState::new());
        Driver::new(
            Box::new(Counted::new(&alive)),
            Rc::clone(&run),
            Rc::new(spawner),
            Arc::new(CollectingDiagnosticSink::new()),
            Rc::new(EffectConfig::default()),
        )
        .start();

        assert_eq!(alive.get(), 0);
    }
}
