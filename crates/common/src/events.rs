//! Integration events exchanged between pipeline stages.
//!
//! Field names are part of the wire contract and stay snake_case. All
//! timestamps serialize as ISO-8601 UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{Severity, UrgencyLevel};

/// Wire names of the integration events.
pub mod event_types {
    pub const COLD_CHAIN_FAILURE: &str = "FallaCadenaFrio";
    pub const STOCK_LOW: &str = "StockBajo";
    pub const SUPPLIER_RECEPTION: &str = "RecepcionProveedor";
    pub const INVENTORY_RECEIVED: &str = "InventarioRecibido";
}

/// An immutable fact published by one stage and consumed by the next.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The `event_type` tag and `event-type` header value.
    const EVENT_TYPE: &'static str;

    /// Unique id, used as the broker-level message identity.
    fn event_id(&self) -> &str;

    /// Key used by partitioned brokers to keep related events in order.
    fn partition_key(&self) -> Option<&str> {
        None
    }
}

/// Temperature excursion reported for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdChainFailureEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "cold_chain_failure_type")]
    pub event_type: String,
    pub product_id: String,
    pub product_name: String,
    pub temperature: f64,
    pub threshold_temperature: f64,
    pub location: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IntegrationEvent for ColdChainFailureEvent {
    const EVENT_TYPE: &'static str = event_types::COLD_CHAIN_FAILURE;

    fn event_id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> Option<&str> {
        Some(&self.product_id)
    }
}

/// A product has fallen to or below its minimum stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLowEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "stock_low_type")]
    pub event_type: String,
    pub product_id: String,
    pub product_name: String,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub location: String,
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StockLowEvent {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        current_stock: i64,
        minimum_stock: i64,
        location: impl Into<String>,
        urgency_level: UrgencyLevel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: stock_low_type(),
            product_id: product_id.into(),
            product_name: product_name.into(),
            current_stock,
            minimum_stock,
            location: location.into(),
            urgency_level,
            metadata: Map::new(),
        }
    }
}

impl IntegrationEvent for StockLowEvent {
    const EVENT_TYPE: &'static str = event_types::STOCK_LOW;

    fn event_id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> Option<&str> {
        Some(&self.product_id)
    }
}

/// A purchase order has been placed with a supplier and awaits reception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierReceptionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "supplier_reception_type")]
    pub event_type: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub supplier_id: String,
    pub supplier_name: String,
    pub location: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SupplierReceptionEvent {
    /// Whether the goods need refrigerated handling on arrival.
    pub fn is_temperature_controlled(&self) -> bool {
        self.metadata
            .get("temperature_controlled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl IntegrationEvent for SupplierReceptionEvent {
    const EVENT_TYPE: &'static str = event_types::SUPPLIER_RECEPTION;

    fn event_id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> Option<&str> {
        Some(&self.purchase_order_id)
    }
}

/// Goods for a purchase order have physically arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReceivedEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "inventory_received_type")]
    pub event_type: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub supplier_id: String,
    pub supplier_name: String,
    pub location: String,
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub quality_check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub batch_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IntegrationEvent for InventoryReceivedEvent {
    const EVENT_TYPE: &'static str = event_types::INVENTORY_RECEIVED;

    fn event_id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> Option<&str> {
        Some(&self.product_id)
    }
}

fn cold_chain_failure_type() -> String {
    event_types::COLD_CHAIN_FAILURE.to_string()
}

fn stock_low_type() -> String {
    event_types::STOCK_LOW.to_string()
}

fn supplier_reception_type() -> String {
    event_types::SUPPLIER_RECEPTION.to_string()
}

fn inventory_received_type() -> String {
    event_types::INVENTORY_RECEIVED.to_string()
}
