//! Call recording for routine tests.

use parking_lot::Mutex;
use std::sync::Arc;

/// Records labelled calls in order. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, label: impl Into<String>) {
        self.calls.lock().push(label.into());
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many times a label was recorded.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == label).count()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Forgets all recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}
