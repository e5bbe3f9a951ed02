//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::purchase_order::PurchaseOrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Purchase order error: {0}")]
    PurchaseOrder(#[from] PurchaseOrderError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Input that can never succeed, no matter how often it is retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Supplier lookup failed: {0}")]
    SupplierLookup(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
