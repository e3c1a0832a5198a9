//! Run state and cancellation handlers.
//!
//! This module provides:
//! - RunState, the per-run record of the canceled flag, handlers and cleanup
//! - RunPhase, the per-run state machine
//! - CancelHandlers and CancelRegistrar for routines to register handlers

mod handlers;
mod run_state;

pub use handlers::{CancelHandlers, CancelRegistrar, OnCancel, OnCancelError};
pub use run_state::{RunPhase, RunState};
