//! Write side of the cold-chain pipeline.
//!
//! One command processor per service:
//! - [`InventoryProcessor`] handles cold-chain failures and received goods
//! - [`PurchaseOrderProcessor`] turns stock-low signals into purchase orders
//! - [`ReceptionProcessor`] checks supplier deliveries in
//!
//! Each processor owns the writes to its service's event log and read model
//! and reports back through the tagged [`Outcome`] type.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod inventory;
pub mod outcome;
pub mod purchase_order;
pub mod reception;
pub mod supplier;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::EventRecorder;
pub use error::DomainError;
pub use inventory::{
    ColdChainProcessed, InventoryEvent, InventoryMovement, InventoryProcessor, MovementType,
    Product, ReceiptProcessed,
};
pub use outcome::Outcome;
pub use purchase_order::{
    CreatePurchaseOrder, PurchaseOrder, PurchaseOrderError, PurchaseOrderEvent,
    PurchaseOrderProcessor, PurchaseOrderStatus, StatusChange, StockLowProcessed,
};
pub use reception::{ReceptionProcessed, ReceptionProcessor, SupplierReception};
pub use supplier::{StaticSupplierDirectory, Supplier, SupplierDirectory};
