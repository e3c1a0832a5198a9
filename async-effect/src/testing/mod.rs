//! Testing utilities for routines and bindings.
//!
//! This module provides:
//! - Awaitables settled by hand, to control when a suspension resumes
//! - A call recorder for asserting on callback order

mod deferred;
mod recorder;

pub use deferred::{deferred, Settle};
pub use recorder::Recorder;
