use serde::Serialize;
use serde_json::{Map, Value};

/// One SSE event as it was seen on the wire, in arrival order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SseEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

/// The unified view a provider's raw SSE body reconstructs into.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ParsedStream {
    pub events: Vec<SseEvent>,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl ParsedStream {
    pub fn push_event(&mut self, event_type: impl Into<String>, data: Value) {
        self.events.push(SseEvent {
            event_type: event_type.into(),
            data,
        });
    }

    /// Append to a string-valued metadata key, creating it empty first if absent.
    pub fn append_metadata_str(&mut self, key: &str, addition: &str) {
        let current = self
            .metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        self.metadata.insert(key.to_string(), Value::String(current + addition));
    }

    pub fn set_metadata_if_absent(&mut self, key: &str, value: Value) {
        self.metadata.entry(key.to_string()).or_insert(value);
    }

    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    /// Counts of events by type, for the read API's `event_counts` field.
    pub fn event_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        counts
    }
}
