//! Shared types for the cold-chain pipeline.
//!
//! Everything that crosses a crate or broker boundary lives here:
//! identifiers, the correlation context, and the integration events
//! exchanged between the four pipeline stages.

pub mod correlation;
pub mod events;
pub mod levels;
pub mod types;

pub use correlation::CorrelationContext;
pub use events::{
    ColdChainFailureEvent, IntegrationEvent, InventoryReceivedEvent, StockLowEvent,
    SupplierReceptionEvent, event_types,
};
pub use levels::{Severity, UrgencyLevel};
pub use types::AggregateId;
