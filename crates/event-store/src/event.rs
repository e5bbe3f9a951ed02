use chrono::{DateTime, Utc};
use common::CorrelationContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-aggregate sequence number, also used as the read-model revision.
///
/// `0` means "nothing written yet"; the first event of an aggregate is `1`
/// and every later append increments by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of an aggregate with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The version carried by an aggregate's first event.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One entry of the append-only log.
///
/// Serialized field names are the persisted layout shared by every service:
/// `{id, aggregate_id, event_type, event_data, timestamp, version,
/// correlation_id?, causation_id?}` plus the owning `aggregate_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

impl EventRecord {
    /// Creates a record stamped with a fresh id and the current time.
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        event_data: serde_json::Value,
        version: Version,
        ctx: &CorrelationContext,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            event_data,
            timestamp: Utc::now(),
            version,
            correlation_id: ctx.correlation(),
            causation_id: ctx.causation(),
        }
    }

    /// Deserializes the event data into a concrete payload type.
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.event_data.clone())
    }

    /// Correlation context recorded with the event.
    pub fn correlation_context(&self) -> CorrelationContext {
        CorrelationContext::from_headers(
            self.correlation_id.as_deref(),
            self.causation_id.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_sequence() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::first() < Version::new(2));
    }

    #[test]
    fn record_carries_correlation_context() {
        let ctx = CorrelationContext::new("corr-1", "cause-1");
        let record = EventRecord::new(
            AggregateId::from("po-1"),
            "PurchaseOrder",
            "PurchaseOrderCreated",
            json!({"quantity": 40}),
            Version::first(),
            &ctx,
        );

        assert_eq!(record.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(record.causation_id.as_deref(), Some("cause-1"));
        assert_eq!(record.correlation_context(), ctx);
    }

    #[test]
    fn empty_context_is_stored_as_none() {
        let record = EventRecord::new(
            AggregateId::from("P1"),
            "Product",
            "ProductRegistered",
            json!({}),
            Version::first(),
            &CorrelationContext::default(),
        );

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("correlation_id").is_none());
        assert!(value.get("causation_id").is_none());
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn data_deserializes_payload() {
        #[derive(Deserialize)]
        struct Payload {
            quantity: i64,
        }

        let record = EventRecord::new(
            AggregateId::from("po-1"),
            "PurchaseOrder",
            "PurchaseOrderCreated",
            json!({"quantity": 40}),
            Version::first(),
            &CorrelationContext::default(),
        );
        let payload: Payload = record.data().unwrap();
        assert_eq!(payload.quantity, 40);
    }
}
