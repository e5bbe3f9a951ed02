use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::InventoryEvent;
use crate::aggregate::Aggregate;

/// Stock level of one product at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub location: String,
    #[serde(default)]
    pub temperature_controlled: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Product {
    pub fn is_low(&self) -> bool {
        self.current_stock <= self.minimum_stock
    }

    /// Applies a movement to the stock level. Stock never goes below zero.
    pub fn apply(&mut self, movement: &InventoryMovement) {
        self.current_stock = match movement.movement_type {
            MovementType::In => self.current_stock.saturating_add(movement.quantity),
            MovementType::Out | MovementType::Loss => {
                self.current_stock.saturating_sub(movement.quantity).max(0)
            }
            MovementType::Adjustment => movement.quantity.max(0),
        };
        self.last_updated = movement.timestamp;
        self.metadata.insert(
            "last_movement_id".to_string(),
            Value::String(movement.id.to_string()),
        );
        self.metadata.insert(
            "last_movement_type".to_string(),
            Value::String(movement.movement_type.as_str().to_string()),
        );
        self.metadata
            .insert("last_movement_quantity".to_string(), movement.quantity.into());
    }

    pub fn last_movement_id(&self) -> Option<&str> {
        self.metadata.get("last_movement_id").and_then(Value::as_str)
    }
}

impl Document for Product {
    fn document_id(&self) -> AggregateId {
        AggregateId::from(self.id.as_str())
    }
}

impl Aggregate for Product {
    type Event = InventoryEvent;

    fn aggregate_type() -> &'static str {
        "Product"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Loss,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Loss => "loss",
        }
    }
}

/// A change to a product's stock, recorded in the inventory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: AggregateId,
    pub product_id: String,
    pub product_name: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
