//! Projections that fold an event log into a read model.

use async_trait::async_trait;
use domain::{InventoryEvent, Product, PurchaseOrder, PurchaseOrderEvent};
use event_store::{EventRecord, PutOptions, ReadModelStore};

use crate::Result;

/// How many events a projection has applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// Applies stored events to a read model.
///
/// Every event in these logs carries the full aggregate snapshot, so
/// applying an event is an unconditional write of that snapshot and replay
/// in log order leaves each document at its latest state.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event. Returns false for events the projection ignores.
    async fn apply(&self, event: &EventRecord) -> Result<bool>;
}

/// Rebuilds purchase-order documents.
pub struct PurchaseOrderProjection<R> {
    read_model: R,
}

impl<R: ReadModelStore<PurchaseOrder>> PurchaseOrderProjection<R> {
    pub fn new(read_model: R) -> Self {
        Self { read_model }
    }
}

#[async_trait]
impl<R: ReadModelStore<PurchaseOrder>> Projection for PurchaseOrderProjection<R> {
    fn name(&self) -> &'static str {
        "purchase_orders"
    }

    async fn apply(&self, event: &EventRecord) -> Result<bool> {
        if event.aggregate_type != "PurchaseOrder" {
            return Ok(false);
        }
        let snapshot = PurchaseOrderEvent::from_record(event)?.into_snapshot();
        self.read_model
            .put(snapshot, PutOptions::unconditional())
            .await?;
        Ok(true)
    }
}

/// Rebuilds product stock documents.
///
/// Cold-chain failure records carry no product state and are skipped.
pub struct ProductProjection<R> {
    products: R,
}

impl<R: ReadModelStore<Product>> ProductProjection<R> {
    pub fn new(products: R) -> Self {
        Self { products }
    }
}

#[async_trait]
impl<R: ReadModelStore<Product>> Projection for ProductProjection<R> {
    fn name(&self) -> &'static str {
        "products"
    }

    async fn apply(&self, event: &EventRecord) -> Result<bool> {
        if event.aggregate_type != "Product" {
            return Ok(false);
        }
        let product = match InventoryEvent::from_record(event)? {
            InventoryEvent::ProductRegistered(registered) => registered.product,
            InventoryEvent::MovementRecorded(recorded) => recorded.product,
            InventoryEvent::ColdChainFailureRecorded(_) => return Ok(false),
        };
        self.products
            .put(product, PutOptions::unconditional())
            .await?;
        Ok(true)
    }
}
