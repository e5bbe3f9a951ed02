//! Purchase order aggregate and its command processor.

mod aggregate;
mod events;
mod policy;
mod processor;
mod status;

pub use aggregate::PurchaseOrder;
pub use events::{
    PURCHASE_ORDER_CREATED, PURCHASE_ORDER_STATUS_UPDATED, PurchaseOrderCreatedData,
    PurchaseOrderEvent, PurchaseOrderStatusUpdatedData, StatusChange, StockLowReference,
};
pub use policy::{EXPECTED_LEAD_TIME_DAYS, reorder_quantity, urgency_multiplier};
pub use processor::{
    CreatePurchaseOrder, PurchaseOrderProcessor, StockLowProcessed, reception_event_for,
};
pub use status::PurchaseOrderStatus;

use thiserror::Error;

/// Business-rule violations on a purchase order.
#[derive(Debug, Error)]
pub enum PurchaseOrderError {
    #[error("Unknown purchase order status: {0}")]
    UnknownStatus(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    },

    #[error("Order quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Minimum stock {0} gives an order quantity out of range")]
    QuantityOutOfRange(i64),

    #[error("Product ID is required")]
    ProductIdRequired,
}
