//! Store configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`StateStore`](crate::StateStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Number of undo steps kept; the oldest entry is dropped beyond it.
    pub max_history: usize,
    /// Child count above which validation emits a warning.
    pub child_warning_threshold: usize,
    /// `source` stamped on every event the store publishes.
    pub event_source: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_history: 100,
            child_warning_threshold: 50,
            event_source: "state-store".to_string(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    #[must_use]
    pub fn with_child_warning_threshold(mut self, threshold: usize) -> Self {
        self.child_warning_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_event_source(mut self, source: impl Into<String>) -> Self {
        self.event_source = source.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = StoreOptions::default();
        assert_eq!(options.max_history, 100);
        assert_eq!(options.child_warning_threshold, 50);
        assert_eq!(options.event_source, "state-store");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options: StoreOptions =
            serde_json::from_str(r#"{ "max_history": 7 }"#).expect("parse");
        assert_eq!(options.max_history, 7);
        assert_eq!(options.child_warning_threshold, 50);
    }
}
