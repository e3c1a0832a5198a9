//! Error types for the async-effect crate.
//!
//! Routine failures and rejection reasons travel as [`anyhow::Error`] so a
//! routine can propagate any error with `?`. The enum below covers the
//! failures the crate raises itself.

use std::any::Any;
use thiserror::Error;

/// The main error type for async-effect operations.
#[derive(Debug, Error)]
pub enum EffectError {
    /// A routine panicked while being resumed.
    #[error("Routine panicked: {0}")]
    Panicked(String),

    /// The spawner refused to schedule a suspended continuation.
    #[error("Failed to schedule continuation: {0}")]
    Spawn(String),

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl EffectError {
    /// Creates a panic error from a caught unwind payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        Self::Panicked(message)
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn(reason.into())
    }
}
