use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key under which the correlation id is mirrored into event payloads.
pub const CORRELATION_ID_KEY: &str = "correlation_id";
/// Metadata key under which the causation id is mirrored into event payloads.
pub const CAUSATION_ID_KEY: &str = "causation_id";

/// The `(correlation_id, causation_id)` pair carried through the pipeline.
///
/// It is extracted once from the transport headers of an inbound message and
/// then passed by value to every command, store write and outbound event.
/// Missing values are represented by empty strings, never by an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub causation_id: String,
}

impl CorrelationContext {
    pub fn new(correlation_id: impl Into<String>, causation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            causation_id: causation_id.into(),
        }
    }

    /// Builds a context from optional header values.
    pub fn from_headers(correlation_id: Option<&str>, causation_id: Option<&str>) -> Self {
        Self::new(
            correlation_id.unwrap_or_default(),
            causation_id.unwrap_or_default(),
        )
    }

    /// Returns a context that starts a new transaction at `event_id` when no
    /// correlation id has been assigned yet.
    ///
    /// Only the first stage of the pipeline uses this; later stages propagate
    /// the context unchanged.
    pub fn or_originate(self, event_id: &str) -> Self {
        if self.correlation_id.is_empty() {
            Self::new(event_id, event_id)
        } else {
            self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.correlation_id.is_empty() && self.causation_id.is_empty()
    }

    /// Correlation id as an optional value, for storage columns.
    pub fn correlation(&self) -> Option<String> {
        non_empty(&self.correlation_id)
    }

    /// Causation id as an optional value, for storage columns.
    pub fn causation(&self) -> Option<String> {
        non_empty(&self.causation_id)
    }

    /// Mirrors the context into an event's metadata map.
    pub fn stamp(&self, metadata: &mut Map<String, Value>) {
        metadata.insert(
            CORRELATION_ID_KEY.to_string(),
            Value::String(self.correlation_id.clone()),
        );
        metadata.insert(
            CAUSATION_ID_KEY.to_string(),
            Value::String(self.causation_id.clone()),
        );
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
