//! Events recorded in a product's inventory log.

use common::ColdChainFailureEvent;
use event_store::EventRecord;
use serde::{Deserialize, Serialize};

use super::{InventoryMovement, Product};
use crate::aggregate::DomainEvent;
use crate::error::DomainError;

pub const PRODUCT_REGISTERED: &str = "ProductRegistered";
pub const COLD_CHAIN_FAILURE_RECORDED: &str = "ColdChainFailureRecorded";
pub const INVENTORY_MOVEMENT_RECORDED: &str = "InventoryMovementRecorded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdChainFailureRecorded {
    pub failure: ColdChainFailureEvent,
}

/// A movement together with the product state right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement: InventoryMovement,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InventoryEvent {
    ProductRegistered(ProductRegistered),
    ColdChainFailureRecorded(ColdChainFailureRecorded),
    MovementRecorded(MovementRecorded),
}

impl InventoryEvent {
    pub fn from_record(record: &EventRecord) -> Result<Self, DomainError> {
        match record.event_type.as_str() {
            PRODUCT_REGISTERED => Ok(InventoryEvent::ProductRegistered(record.data()?)),
            COLD_CHAIN_FAILURE_RECORDED => {
                Ok(InventoryEvent::ColdChainFailureRecorded(record.data()?))
            }
            INVENTORY_MOVEMENT_RECORDED => Ok(InventoryEvent::MovementRecorded(record.data()?)),
            other => Err(DomainError::Validation(format!(
                "unknown inventory event type: {other}"
            ))),
        }
    }
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ProductRegistered(_) => PRODUCT_REGISTERED,
            InventoryEvent::ColdChainFailureRecorded(_) => COLD_CHAIN_FAILURE_RECORDED,
            InventoryEvent::MovementRecorded(_) => INVENTORY_MOVEMENT_RECORDED,
        }
    }
}
