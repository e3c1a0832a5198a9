//! Configuration for async effect bindings.

use serde::{Deserialize, Serialize};

use crate::errors::EffectError;

/// Configuration shared by a binding and the driver loops it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Prefix used in diagnostic messages.
    #[serde(default = "default_label")]
    pub label: String,
    /// Whether a panic inside `Routine::resume` is reported as an unhandled
    /// failure instead of unwinding through the driver.
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
    /// Whether rejections arriving after cancellation with no error handler
    /// registered are reported at debug severity.
    #[serde(default)]
    pub report_dropped_rejections: bool,
}

fn default_label() -> String {
    "async-effect".to_string()
}

fn default_catch_panics() -> bool {
    true
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            catch_panics: default_catch_panics(),
            report_dropped_rejections: false,
        }
    }
}

impl EffectConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, EffectError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the diagnostic label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets whether routine panics are caught.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Sets whether dropped post-cancellation rejections are reported.
    #[must_use]
    pub fn with_report_dropped_rejections(mut self, report: bool) -> Self {
        self.report_dropped_rejections = report;
        self
    }

    /// Formats a diagnostic message with the configured label.
    #[must_use]
    pub fn message(&self, text: &str) -> String {
        format!("[{}] {}", self.label, text)
    }
}
