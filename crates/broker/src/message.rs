//! Broker-neutral message and its header codec.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CorrelationContext, IntegrationEvent};

use crate::Result;

/// Transport header names.
pub mod headers {
    pub const CORRELATION_ID: &str = "correlation-id";
    pub const CAUSATION_ID: &str = "causation-id";
    pub const EVENT_TYPE: &str = "event-type";
    pub const CONTENT_TYPE: &str = "content-type";
    /// Delivery attempts already made, carried by brokers without native redelivery.
    pub const DELIVERY_COUNT: &str = "x-delivery-count";

    pub const APPLICATION_JSON: &str = "application/json";
}

/// String-valued transport headers.
pub type Headers = BTreeMap<String, String>;

/// A message as every adapter sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Broker-level identity. Set to the domain event id.
    pub id: String,
    pub payload: Vec<u8>,
    pub headers: Headers,
    pub timestamp: Option<DateTime<Utc>>,
    /// Survives a broker restart.
    pub persistent: bool,
    /// Ordering key for partitioned brokers.
    pub key: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            headers: Headers::new(),
            timestamp: None,
            persistent: true,
            key: None,
        }
    }

    /// Encodes a domain event as a persistent JSON message stamped with `ctx`.
    pub fn from_event<E: IntegrationEvent>(event: &E, ctx: &CorrelationContext) -> Result<Self> {
        let mut message = Self::new(event.event_id(), serde_json::to_vec(event)?)
            .with_header(headers::EVENT_TYPE, E::EVENT_TYPE)
            .with_header(headers::CONTENT_TYPE, headers::APPLICATION_JSON)
            .with_correlation(ctx);
        message.timestamp = Some(Utc::now());
        message.key = event.partition_key().map(str::to_string);
        Ok(message)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn with_correlation(self, ctx: &CorrelationContext) -> Self {
        self.with_header(headers::CORRELATION_ID, ctx.correlation_id.as_str())
            .with_header(headers::CAUSATION_ID, ctx.causation_id.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header(headers::EVENT_TYPE)
    }

    /// Reads the correlation pair. Absent headers become empty strings.
    pub fn correlation_context(&self) -> CorrelationContext {
        CorrelationContext::from_headers(
            self.header(headers::CORRELATION_ID),
            self.header(headers::CAUSATION_ID),
        )
    }

    /// Decodes the JSON payload.
    pub fn decode<E: IntegrationEvent>(&self) -> serde_json::Result<E> {
        serde_json::from_slice(&self.payload)
    }

    pub fn delivery_count(&self) -> u32 {
        self.header(headers::DELIVERY_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{StockLowEvent, UrgencyLevel};

    #[test]
    fn event_message_carries_identity_and_context() {
        let event = StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::High);
        let ctx = CorrelationContext::new("corr-1", "cause-1");
        let message = Message::from_event(&event, &ctx).unwrap();

        assert_eq!(message.id, event.id);
        assert!(message.persistent);
        assert_eq!(message.event_type(), Some("StockBajo"));
        assert_eq!(message.header(headers::CONTENT_TYPE), Some("application/json"));
        assert_eq!(message.correlation_context(), ctx);
        assert_eq!(message.decode::<StockLowEvent>().unwrap(), event);
    }

    #[test]
    fn missing_correlation_headers_are_empty() {
        let message = Message::new("m-1", b"{}".to_vec());
        assert_eq!(message.correlation_context(), CorrelationContext::default());
        assert_eq!(message.delivery_count(), 0);
    }

    #[test]
    fn malformed_payload_fails_to_decode() {
        let message = Message::new("m-1", b"not json".to_vec());
        assert!(message.decode::<StockLowEvent>().is_err());
    }
}
