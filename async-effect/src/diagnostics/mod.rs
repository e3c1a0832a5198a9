//! Diagnostic reporting for driver loops.
//!
//! Unhandled routine failures are reported through an injectable
//! [`DiagnosticSink`] rather than a global logger, so hosts can route them and
//! tests can assert on them.

mod sink;

pub use sink::{
    CollectingDiagnosticSink, Diagnostic, DiagnosticSink, NoOpDiagnosticSink, Severity,
    TracingDiagnosticSink,
};
