//! The suspend/resume protocol driven by the driver loop.
//!
//! A [`Routine`] is a single-use state machine. Each call to
//! [`Routine::resume`] runs it up to its next suspension point and returns a
//! [`Step`]: a plain value to be handed straight back, an [`Awaitable`] to wait
//! on, or completion with an optional [`Cleanup`].

mod steps;

pub use steps::Steps;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// A future a routine suspends on. Rejection is an `Err`.
pub type Awaitable<V> = LocalBoxFuture<'static, anyhow::Result<V>>;

/// What a routine is resumed with.
pub enum Resume<V> {
    /// First resume of a fresh routine.
    Start,
    /// The value the previous suspension resolved to.
    Value(V),
    /// The awaited value rejected; raised at the suspension point.
    Error(anyhow::Error),
}

impl<V> Resume<V> {
    /// Converts into a result, so a routine can propagate a rejection with `?`
    /// or catch it with `match`.
    ///
    /// `Start` becomes `Ok(None)`.
    pub fn into_result(self) -> anyhow::Result<Option<V>> {
        match self {
            Self::Start => Ok(None),
            Self::Value(value) => Ok(Some(value)),
            Self::Error(err) => Err(err),
        }
    }

    /// Returns the resumed value, discarding errors.
    pub fn value(self) -> Option<V> {
        match self {
            Self::Value(value) => Some(value),
            Self::Start | Self::Error(_) => None,
        }
    }

    /// Returns true if this resume carries a rejection.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl<V: fmt::Debug> fmt::Debug for Resume<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Error(err) => f.debug_tuple("Error").field(&err.to_string()).finish(),
        }
    }
}

/// A cleanup action produced by a routine that completed normally.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wraps a closure as a cleanup action.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Runs the cleanup, consuming it.
    pub fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// The outcome of resuming a routine once.
pub enum Step<V> {
    /// A plain value, handed back on the next resume without suspending.
    Yield(V),
    /// Suspend until the awaitable settles.
    Await(Awaitable<V>),
    /// The routine finished.
    Done(Option<Cleanup>),
}

impl<V: 'static> Step<V> {
    /// Suspends on a future that cannot fail.
    pub fn await_ok<F>(future: F) -> Self
    where
        F: Future<Output = V> + 'static,
    {
        Self::Await(future.map(Ok).boxed_local())
    }

    /// Suspends on a fallible future.
    pub fn await_result<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<V, E>> + 'static,
        E: Into<anyhow::Error>,
    {
        Self::Await(future.map(|r| r.map_err(Into::into)).boxed_local())
    }

    /// Suspends on an already resolved value.
    pub fn ready(value: V) -> Self {
        Self::Await(futures::future::ready(Ok(value)).boxed_local())
    }

    /// Suspends on an already rejected value.
    pub fn rejected(reason: impl Into<anyhow::Error>) -> Self {
        Self::Await(futures::future::ready(Err(reason.into())).boxed_local())
    }
}

impl<V> Step<V> {
    /// Finishes without a cleanup action.
    #[must_use]
    pub const fn done() -> Self {
        Self::Done(None)
    }

    /// Finishes, leaving a cleanup action for teardown.
    pub fn done_with(cleanup: impl FnOnce() + 'static) -> Self {
        Self::Done(Some(Cleanup::new(cleanup)))
    }
}

impl<V: fmt::Debug> fmt::Debug for Step<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield(value) => f.debug_tuple("Yield").field(value).finish(),
            Self::Await(_) => f.write_str("Await(..)"),
            Self::Done(cleanup) => f.debug_tuple("Done").field(&cleanup.is_some()).finish(),
        }
    }
}

/// A resumable, single-use sequence of suspension requests.
///
/// The driver resumes a routine with [`Resume::Start`] first, then with the
/// value (or rejection) each suspension settled to. It never resumes a routine
/// again after it returned [`Step::Done`] or an error, or after its run was
/// canceled.
pub trait Routine {
    /// The type of values passed across suspension points.
    type Value;

    /// Runs the routine up to its next suspension point.
    ///
    /// Returning `Err` means the routine failed, either on its own or by not
    /// catching a rejection delivered as [`Resume::Error`].
    fn resume(&mut self, input: Resume<Self::Value>) -> anyhow::Result<Step<Self::Value>>;
}

impl<R: Routine + ?Sized> Routine for Box<R> {
    type Value = R::Value;

    fn resume(&mut self, input: Resume<Self::Value>) -> anyhow::Result<Step<Self::Value>> {
        (**self).resume(input)
    }
}

/// A routine backed by a closure holding its own state.
pub struct FromFn<F, V> {
    f: F,
    _value: PhantomData<fn(Resume<V>)>,
}

impl<F, V> Routine for FromFn<F, V>
where
    F: FnMut(Resume<V>) -> anyhow::Result<Step<V>>,
{
    type Value = V;

    fn resume(&mut self, input: Resume<V>) -> anyhow::Result<Step<V>> {
        (self.f)(input)
    }
}

impl<F, V> fmt::Debug for FromFn<F, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FromFn")
    }
}

/// Creates a routine from a closure that is called on every resume.
pub fn from_fn<V, F>(f: F) -> FromFn<F, V>
where
    F: FnMut(Resume<V>) -> anyhow::Result<Step<V>>,
{
    FromFn {
        f,
        _value: PhantomData,
    }
}
