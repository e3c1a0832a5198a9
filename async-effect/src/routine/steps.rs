//! Linear routines built from a list of stage closures.

use std::collections::VecDeque;
use std::fmt;

use super::{Resume, Routine, Step};

type Stage<V> = Box<dyn FnOnce(Resume<V>) -> anyhow::Result<Step<V>>>;

/// A routine made of stages run one per resume, in order.
///
/// Each stage receives what the previous suspension resumed with. Returning
/// [`Step::Done`] discards any remaining stages. When the stages run out the
/// routine completes without cleanup, unless it was resumed with a rejection,
/// which then propagates as an uncaught failure.
///
/// ```rust,ignore
/// let routine = Steps::new()
///     .then(|_| Ok(Step::await_ok(fetch_profile())))
///     .then(move |input| {
///         let profile = input.into_result()?;
///         Ok(Step::done_with(move || drop(profile)))
///     });
/// ```
pub struct Steps<V> {
    stages: VecDeque<Stage<V>>,
}

impl<V> Steps<V> {
    /// Creates an empty routine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: VecDeque::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: FnOnce(Resume<V>) -> anyhow::Result<Step<V>> + 'static,
    {
        self.stages.push_back(Box::new(stage));
        self
    }

    /// Returns the number of stages not yet run.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

impl<V> Default for Steps<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Routine for Steps<V> {
    type Value = V;

    fn resume(&mut self, input: Resume<V>) -> anyhow::Result<Step<V>> {
        let Some(stage) = self.stages.pop_front() else {
            input.into_result()?;
            return Ok(Step::done());
        };

        let step = stage(input)?;
        if matches!(step, Step::Done(_)) {
            self.stages.clear();
        }
        Ok(step)
    }
}

impl<V> fmt::Debug for Steps<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Steps")
            .field("remaining", &self.remaining())
            .finish()
    }
}
