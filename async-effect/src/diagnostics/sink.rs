//! Diagnostic sink trait and implementations.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Internal detail, usually suppressed.
    Debug,
    /// Informational.
    Info,
    /// Something unexpected that did not stop a run.
    Warn,
    /// A run failed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Trait for sinks that receive diagnostics from driver loops.
///
/// Reporting must never panic; implementations swallow their own failures.
pub trait DiagnosticSink: Send + Sync {
    /// Reports a diagnostic.
    ///
    /// # Arguments
    ///
    /// * `severity` - How serious the condition is
    /// * `message` - Human readable description, already labelled
    /// * `error` - The underlying error, if any
    fn report(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>);
}

/// A sink that discards all diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDiagnosticSink;

impl DiagnosticSink for NoOpDiagnosticSink {
    fn report(&self, _severity: Severity, _message: &str, _error: Option<&anyhow::Error>) {}
}

/// A sink that forwards diagnostics to the tracing framework.
///
/// This is the default sink for new bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnosticSink;

impl DiagnosticSink for TracingDiagnosticSink {
    fn report(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>) {
        let error = error.map(|e| format!("{e:#}"));
        match severity {
            Severity::Debug => debug!(error = ?error, "{}", message),
            Severity::Info => info!(error = ?error, "{}", message),
            Severity::Warn => warn!(error = ?error, "{}", message),
            Severity::Error => error!(error = ?error, "{}", message),
        }
    }
}

/// A diagnostic captured by [`CollectingDiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity it was reported with.
    pub severity: Severity,
    /// The reported message.
    pub message: String,
    /// Rendered error chain, if an error was attached.
    pub error: Option<String>,
    /// When it was reported.
    pub reported_at: DateTime<Utc>,
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingDiagnosticSink {
    diagnostics: RwLock<Vec<Diagnostic>>,
}

impl CollectingDiagnosticSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.read().clone()
    }

    /// Returns the number of collected diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.read().len()
    }

    /// Returns true if nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.read().is_empty()
    }

    /// Returns diagnostics reported with the given severity.
    #[must_use]
    pub fn of_severity(&self, severity: Severity) -> Vec<Diagnostic> {
        self.diagnostics
            .read()
            .iter()
            .filter(|d| d.severity == severity)
            .cloned()
            .collect()
    }

    /// Clears all collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.write().clear();
    }
}

impl DiagnosticSink for CollectingDiagnosticSink {
    fn report(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>) {
        self.diagnostics.write().push(Diagnostic {
            severity,
            message: message.to_string(),
            error: error.map(|e| format!("{e:#}")),
            reported_at: Utc::now(),
        });
    }
}
