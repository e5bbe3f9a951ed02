//! Query side of the cold-chain pipeline.
//!
//! - [`PurchaseOrderQueries`]: lookups, filtered lists, event history,
//!   overdue detection and statistics over the purchase-order read model
//! - [`InventoryQueries`]: product stock and movement history
//! - [`ReadModelRebuilder`]: replays an event log back into read models
//!
//! Queries never write. They see the read model as the write side last left
//! it, with no read-your-writes guarantee across stores.

pub mod error;
pub mod filter;
pub mod inventory;
pub mod projection;
pub mod purchase_orders;
pub mod rebuild;

pub use error::{ProjectionError, Result};
pub use filter::{DateRange, EventHistoryFilter, ProductFilter, PurchaseOrderFilter};
pub use inventory::InventoryQueries;
pub use projection::{ProductProjection, Projection, ProjectionPosition, PurchaseOrderProjection};
pub use purchase_orders::{PurchaseOrderQueries, PurchaseOrderStats};
pub use rebuild::ReadModelRebuilder;
