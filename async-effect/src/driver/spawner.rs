//! Scheduling of suspended continuations.

use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawn;
use std::rc::Rc;
use tokio::task::LocalSet;

use crate::errors::EffectError;

/// Schedules the continuation of a suspended run on a single-threaded
/// executor.
///
/// The task is `!Send`; implementations must poll it on the thread that owns
/// the binding.
#[cfg_attr(test, mockall::automock)]
pub trait TaskSpawner {
    /// Schedules a task to be polled to completion.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> Result<(), EffectError>;
}

impl TaskSpawner for LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> Result<(), EffectError> {
        self.spawn_local_obj(task.into())
            .map_err(|e| EffectError::spawn(e.to_string()))
    }
}

/// Spawns continuations onto a tokio [`LocalSet`].
///
/// Spawning works whether or not the set is currently running; queued
/// continuations make progress once the set is driven, through
/// [`LocalSet::run_until`] or by awaiting it.
#[derive(Debug, Clone)]
pub struct TokioLocalSpawner {
    local: Rc<LocalSet>,
}

impl TokioLocalSpawner {
    /// Creates a spawner for `local`.
    #[must_use]
    pub fn new(local: Rc<LocalSet>) -> Self {
        Self { local }
    }

    /// Returns the set continuations are spawned onto.
    #[must_use]
    pub fn local_set(&self) -> &Rc<LocalSet> {
        &self.local
    }
}

impl TaskSpawner for TokioLocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> Result<(), EffectError> {
        // Detached; the driver owns the run's outcome.
        drop(self.local.spawn_local(task));
        Ok(())
    }
}
