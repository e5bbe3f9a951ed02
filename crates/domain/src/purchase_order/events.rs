//! Events recorded in a purchase order's log.

use event_store::EventRecord;
use serde::{Deserialize, Serialize};

use super::{PurchaseOrder, PurchaseOrderStatus};
use crate::aggregate::DomainEvent;
use crate::error::DomainError;
use common::UrgencyLevel;

pub const PURCHASE_ORDER_CREATED: &str = "PurchaseOrderCreated";
pub const PURCHASE_ORDER_STATUS_UPDATED: &str = "PurchaseOrderStatusUpdated";

/// The stock-low event that triggered an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLowReference {
    pub id: String,
    pub product_id: String,
    pub urgency_level: UrgencyLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub old_status: PurchaseOrderStatus,
    pub new_status: PurchaseOrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderCreatedData {
    pub purchase_order: PurchaseOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_low_event: Option<StockLowReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderStatusUpdatedData {
    pub purchase_order: PurchaseOrder,
    pub status_change: StatusChange,
}

/// Every event carries the full order snapshot after the change, so the
/// read model can be rebuilt from the last event alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PurchaseOrderEvent {
    Created(PurchaseOrderCreatedData),
    StatusUpdated(PurchaseOrderStatusUpdatedData),
}

impl PurchaseOrderEvent {
    pub fn snapshot(&self) -> &PurchaseOrder {
        match self {
            PurchaseOrderEvent::Created(data) => &data.purchase_order,
            PurchaseOrderEvent::StatusUpdated(data) => &data.purchase_order,
        }
    }

    pub fn into_snapshot(self) -> PurchaseOrder {
        match self {
            PurchaseOrderEvent::Created(data) => data.purchase_order,
            PurchaseOrderEvent::StatusUpdated(data) => data.purchase_order,
        }
    }

    /// Decodes a stored record; the type column selects the payload shape.
    pub fn from_record(record: &EventRecord) -> Result<Self, DomainError> {
        match record.event_type.as_str() {
            PURCHASE_ORDER_CREATED => Ok(PurchaseOrderEvent::Created(record.data()?)),
            PURCHASE_ORDER_STATUS_UPDATED => Ok(PurchaseOrderEvent::StatusUpdated(record.data()?)),
            other => Err(DomainError::Validation(format!(
                "unknown purchase order event type: {other}"
            ))),
        }
    }
}

impl DomainEvent for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::Created(_) => PURCHASE_ORDER_CREATED,
            PurchaseOrderEvent::StatusUpdated(_) => PURCHASE_ORDER_STATUS_UPDATED,
        }
    }
}
