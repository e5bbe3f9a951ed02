use std::time::Instant;

use chrono::Utc;
use common::{
    AggregateId, CorrelationContext, StockLowEvent, SupplierReceptionEvent, UrgencyLevel,
    event_types,
};
use event_store::{EventStore, PutOptions, ReadModelStore, Versioned};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::aggregate::{STOCK_LOW_EVENT_ID_KEY, TEMPERATURE_CONTROLLED_KEY};
use super::events::{
    PurchaseOrderCreatedData, PurchaseOrderEvent, PurchaseOrderStatusUpdatedData,
    StockLowReference,
};
use super::{PurchaseOrder, PurchaseOrderStatus};
use crate::aggregate::Aggregate;
use crate::command::EventRecorder;
use crate::error::DomainError;
use crate::outcome::Outcome;
use crate::supplier::{Supplier, SupplierDirectory};

/// Result of handling a stock-low event.
#[derive(Debug, Clone)]
pub struct StockLowProcessed {
    pub purchase_order: PurchaseOrder,
    /// Event to publish onward to the supplier stage.
    pub reception_event: SupplierReceptionEvent,
    /// The event had already been processed; nothing new was written.
    pub duplicate: bool,
}

/// Direct request to place a purchase order.
#[derive(Debug, Clone)]
pub struct CreatePurchaseOrder {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub location: String,
    pub urgency_level: UrgencyLevel,
    /// Supplier to order from; looked up from the directory when absent.
    pub supplier: Option<Supplier>,
}

/// Write side of the purchase-order service.
///
/// Owns every write to the purchase-order event log and read model.
pub struct PurchaseOrderProcessor<E, R, D>
where
    E: EventStore,
    R: ReadModelStore<PurchaseOrder>,
    D: SupplierDirectory,
{
    recorder: EventRecorder<E>,
    read_model: R,
    suppliers: D,
}

impl<E, R, D> PurchaseOrderProcessor<E, R, D>
where
    E: EventStore,
    R: ReadModelStore<PurchaseOrder>,
    D: SupplierDirectory,
{
    pub fn new(event_store: E, read_model: R, suppliers: D) -> Self {
        Self {
            recorder: EventRecorder::new(event_store),
            read_model,
            suppliers,
        }
    }

    pub fn event_store(&self) -> &E {
        self.recorder.store()
    }

    pub fn read_model(&self) -> &R {
        &self.read_model
    }

    /// Places the reorder for a stock-low event and returns the reception
    /// event to publish.
    ///
    /// Replaying the same event returns the order created the first time
    /// together with an identical reception event.
    #[tracing::instrument(
        skip(self, event, ctx),
        fields(event_id = %event.id, product_id = %event.product_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn process_stock_low(
        &self,
        event: &StockLowEvent,
        ctx: &CorrelationContext,
    ) -> Outcome<StockLowProcessed> {
        let started = Instant::now();
        let outcome = self.try_process_stock_low(event, ctx).await.into();
        record_duration("process_stock_low", started);
        outcome
    }

    async fn try_process_stock_low(
        &self,
        event: &StockLowEvent,
        ctx: &CorrelationContext,
    ) -> Result<StockLowProcessed, DomainError> {
        let id = PurchaseOrder::id_for_stock_low(&event.id);

        if let Some(existing) = self.read_model.get(&id).await? {
            info!(purchase_order_id = %id, "Stock-low event already processed");
            return Ok(self.processed(existing.document, ctx, true));
        }

        let supplier = self.suppliers.supplier_for_product(&event.product_id).await?;
        let mut order = PurchaseOrder::from_stock_low(event, &supplier, Utc::now())?;
        ctx.stamp(&mut order.metadata);

        let created = PurchaseOrderEvent::Created(PurchaseOrderCreatedData {
            purchase_order: order.clone(),
            stock_low_event: Some(StockLowReference {
                id: event.id.clone(),
                product_id: event.product_id.clone(),
                urgency_level: event.urgency_level.clone(),
            }),
        });

        let (order, duplicate) = self.persist_new(order, &created, ctx).await?;
        if !duplicate {
            metrics::counter!("purchase_orders_created_total").increment(1);
            info!(
                purchase_order_id = %order.id,
                quantity = order.quantity,
                supplier_id = %order.supplier_id,
                "Purchase order created"
            );
        }
        Ok(self.processed(order, ctx, duplicate))
    }

    /// Places a purchase order that was not triggered by a stock-low event.
    #[tracing::instrument(skip(self, command, ctx), fields(product_id = %command.product_id))]
    pub async fn create_purchase_order(
        &self,
        command: CreatePurchaseOrder,
        ctx: &CorrelationContext,
    ) -> Outcome<PurchaseOrder> {
        let started = Instant::now();
        let outcome = self.try_create_purchase_order(command, ctx).await.into();
        record_duration("create_purchase_order", started);
        outcome
    }

    async fn try_create_purchase_order(
        &self,
        command: CreatePurchaseOrder,
        ctx: &CorrelationContext,
    ) -> Result<PurchaseOrder, DomainError> {
        let supplier = match command.supplier {
            Some(supplier) => supplier,
            None => {
                self.suppliers
                    .supplier_for_product(&command.product_id)
                    .await?
            }
        };

        let mut order = PurchaseOrder::new(
            AggregateId::new(),
            command.product_id,
            command.product_name,
            command.quantity,
            &supplier,
            command.location,
            command.urgency_level,
            Utc::now(),
        )?;
        ctx.stamp(&mut order.metadata);

        let created = PurchaseOrderEvent::Created(PurchaseOrderCreatedData {
            purchase_order: order.clone(),
            stock_low_event: None,
        });
        let (order, _) = self.persist_new(order, &created, ctx).await?;

        metrics::counter!("purchase_orders_created_total").increment(1);
        info!(purchase_order_id = %order.id, "Purchase order created");
        Ok(order)
    }

    /// Moves an order to a new status.
    ///
    /// The read-model write is a compare-and-swap on the revision read at the
    /// start, so a concurrent update surfaces as a retryable store error
    /// instead of being lost.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn update_status(
        &self,
        id: &AggregateId,
        status: PurchaseOrderStatus,
        ctx: &CorrelationContext,
    ) -> Outcome<PurchaseOrder> {
        let started = Instant::now();
        let outcome = self.try_update_status(id, status, ctx).await.into();
        record_duration("update_status", started);
        outcome
    }

    async fn try_update_status(
        &self,
        id: &AggregateId,
        status: PurchaseOrderStatus,
        ctx: &CorrelationContext,
    ) -> Result<PurchaseOrder, DomainError> {
        let Versioned {
            revision,
            document: mut order,
        } = self
            .read_model
            .get(id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: PurchaseOrder::aggregate_type(),
                aggregate_id: id.to_string(),
            })?;

        let status_change = order.update_status(status, Utc::now())?;

        self.read_model
            .put(order.clone(), PutOptions::expect_revision(revision))
            .await?;

        let updated = PurchaseOrderEvent::StatusUpdated(PurchaseOrderStatusUpdatedData {
            purchase_order: order.clone(),
            status_change,
        });
        self.recorder
            .record_next::<PurchaseOrder>(id, &updated, ctx)
            .await?;

        metrics::counter!("purchase_order_status_updates_total").increment(1);
        info!(
            purchase_order_id = %id,
            old_status = %status_change.old_status,
            new_status = %status_change.new_status,
            "Purchase order status updated"
        );
        Ok(order)
    }

    /// Records a new order's creation and publishes it to the read model.
    ///
    /// Returns the stored order and whether it already existed. An earlier
    /// attempt may have crashed between the two writes; the read model is
    /// then restored from the first event's snapshot.
    async fn persist_new(
        &self,
        order: PurchaseOrder,
        created: &PurchaseOrderEvent,
        ctx: &CorrelationContext,
    ) -> Result<(PurchaseOrder, bool), DomainError> {
        let id = order.id.clone();

        let (order, duplicate) = match self
            .recorder
            .record_first::<PurchaseOrder>(&id, created, ctx)
            .await
        {
            Ok(_) => (order, false),
            Err(DomainError::EventStore(err)) if err.is_conflict() => {
                warn!(purchase_order_id = %id, "Creation already recorded, restoring read model");
                (self.first_snapshot(&id).await?, true)
            }
            Err(err) => return Err(err),
        };

        match self
            .read_model
            .put(order.clone(), PutOptions::expect_new())
            .await
        {
            Ok(_) => Ok((order, duplicate)),
            Err(err) if err.is_conflict() => match self.read_model.get(&id).await? {
                Some(existing) => Ok((existing.document, true)),
                None => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn first_snapshot(&self, id: &AggregateId) -> Result<PurchaseOrder, DomainError> {
        let events = self.recorder.store().get_events_for_aggregate(id).await?;
        let first = events
            .first()
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: PurchaseOrder::aggregate_type(),
                aggregate_id: id.to_string(),
            })?;
        Ok(PurchaseOrderEvent::from_record(first)?.into_snapshot())
    }

    fn processed(
        &self,
        purchase_order: PurchaseOrder,
        ctx: &CorrelationContext,
        duplicate: bool,
    ) -> StockLowProcessed {
        StockLowProcessed {
            reception_event: reception_event_for(&purchase_order, ctx),
            purchase_order,
            duplicate,
        }
    }
}

/// Builds the pending reception event for an order.
///
/// Id and timestamp derive from the order, so building it twice for the same
/// order yields the same event.
pub fn reception_event_for(order: &PurchaseOrder, ctx: &CorrelationContext) -> SupplierReceptionEvent {
    let mut metadata = Map::new();
    ctx.stamp(&mut metadata);
    metadata.insert(
        "purchase_order_id".to_string(),
        Value::String(order.id.to_string()),
    );
    if let Some(stock_low_id) = order.stock_low_event_id() {
        metadata.insert(
            STOCK_LOW_EVENT_ID_KEY.to_string(),
            Value::String(stock_low_id.to_string()),
        );
    }
    if let Some(flag) = order.metadata.get(TEMPERATURE_CONTROLLED_KEY) {
        metadata.insert(TEMPERATURE_CONTROLLED_KEY.to_string(), flag.clone());
    }

    SupplierReceptionEvent {
        id: AggregateId::derived_from("supplier-reception", order.id.as_str()).into_string(),
        timestamp: order.created_at,
        event_type: event_types::SUPPLIER_RECEPTION.to_string(),
        purchase_order_id: order.id.to_string(),
        product_id: order.product_id.clone(),
        product_name: order.product_name.clone(),
        quantity: order.quantity,
        supplier_id: order.supplier_id.clone(),
        supplier_name: order.supplier_name.clone(),
        location: order.location.clone(),
        status: PurchaseOrderStatus::Pending.to_string(),
        metadata,
    }
}

fn record_duration(command: &'static str, started: Instant) {
    metrics::histogram!("command_duration_seconds", "command" => command)
        .record(started.elapsed().as_secs_f64());
}
