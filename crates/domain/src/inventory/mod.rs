//! Inventory service: product stock, movements, and the stock-low signal.

mod events;
mod model;
mod policy;
mod processor;

pub use events::{
    COLD_CHAIN_FAILURE_RECORDED, ColdChainFailureRecorded, INVENTORY_MOVEMENT_RECORDED,
    InventoryEvent, MovementRecorded, PRODUCT_REGISTERED, ProductRegistered,
};
pub use model::{InventoryMovement, MovementType, Product};
pub use policy::{classify_urgency, loss_factor, loss_quantity};
pub use processor::{ColdChainProcessed, InventoryProcessor, ReceiptProcessed};
