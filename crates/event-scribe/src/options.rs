use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Construction parameters for an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOptions {
    /// File the sink appends to for its whole lifetime.
    pub destination: PathBuf,

    /// Event-name to tag-pattern map reserved for per-event filtering
    /// (e.g. `request: "*"`). Accepted and logged, but every event on the
    /// report channel is persisted regardless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<BTreeMap<String, String>>,
}

impl SinkOptions {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: BTreeMap<String, String>) -> Self {
        self.events = Some(events);
        self
    }
}
