//! # async-effect
//!
//! Cancellable suspend/resume routines bound to a component's lifecycle.
//!
//! A routine runs synchronously until it suspends on an awaitable. The driver
//! loop resumes it with the settled value, unless the run was torn down in
//! the meantime, in which case the routine is never resumed again.
//!
//! - **Routines**: single-use state machines returning a [`routine::Step`]
//! - **Driver loop**: cancellation-aware pumping over a pluggable task spawner
//! - **Cancellation handlers**: one active handler pair per suspension point
//! - **Lifecycle binding**: dependency-tracked runs with cleanup on teardown
//! - **Diagnostics**: unhandled failures go to an injectable sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use async_effect::prelude::*;
//!
//! let mut pool = futures::executor::LocalPool::new();
//! let mut effect = AsyncEffect::new(pool.spawner());
//!
//! effect.render(
//!     move |registrar| {
//!         Steps::new()
//!             .then(move |_| {
//!                 registrar.on_cancel(|| println!("canceled"));
//!                 Ok(Step::await_ok(load_profile(user_id)))
//!             })
//!             .then(|profile| {
//!                 show(profile.value());
//!                 Ok(Step::done())
//!             })
//!     },
//!     user_id,
//! );
//!
//! pool.run_until_stalled();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod binding;
pub mod cancellation;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod errors;
pub mod host;
pub mod routine;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::binding::AsyncEffect;
    pub use crate::cancellation::{CancelHandlers, CancelRegistrar, RunPhase, RunState};
    pub use crate::config::EffectConfig;
    pub use crate::diagnostics::{
        CollectingDiagnosticSink, DiagnosticSink, NoOpDiagnosticSink, Severity,
        TracingDiagnosticSink,
    };
    pub use crate::driver::{Driver, TaskSpawner, TokioLocalSpawner};
    pub use crate::errors::EffectError;
    pub use crate::host::{EffectCell, Teardown};
    pub use crate::routine::{from_fn, Awaitable, Cleanup, Resume, Routine, Step, Steps};
}
