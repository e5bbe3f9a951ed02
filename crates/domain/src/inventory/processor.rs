use std::time::Instant;

use chrono::Utc;
use common::{
    AggregateId, ColdChainFailureEvent, CorrelationContext, InventoryReceivedEvent,
    StockLowEvent, event_types,
};
use event_store::{
    Document, EventRecord, EventStore, PutOptions, ReadModelStore, Version, Versioned,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::events::{
    COLD_CHAIN_FAILURE_RECORDED, ColdChainFailureRecorded, INVENTORY_MOVEMENT_RECORDED,
    InventoryEvent, MovementRecorded, ProductRegistered,
};
use super::policy::{classify_urgency, loss_quantity};
use super::{InventoryMovement, MovementType, Product};
use crate::aggregate::Aggregate;
use crate::command::EventRecorder;
use crate::error::DomainError;
use crate::outcome::Outcome;

/// Result of handling a cold-chain failure.
#[derive(Debug, Clone, Default)]
pub struct ColdChainProcessed {
    /// Stock written off, if any.
    pub movement: Option<InventoryMovement>,
    /// Signal for the purchase-order stage when stock is now low.
    pub stock_low_event: Option<StockLowEvent>,
    pub duplicate: bool,
}

/// Result of booking received goods into stock.
#[derive(Debug, Clone)]
pub struct ReceiptProcessed {
    pub movement: InventoryMovement,
    pub product: Product,
    pub duplicate: bool,
}

/// Write side of the inventory service.
pub struct InventoryProcessor<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    recorder: EventRecorder<E>,
    products: R,
}

impl<E, R> InventoryProcessor<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    pub fn new(event_store: E, products: R) -> Self {
        Self {
            recorder: EventRecorder::new(event_store),
            products,
        }
    }

    pub fn products(&self) -> &R {
        &self.products
    }

    /// Creates or replaces a product's stock record.
    #[tracing::instrument(skip(self, product, ctx), fields(product_id = %product.id))]
    pub async fn register_product(
        &self,
        product: Product,
        ctx: &CorrelationContext,
    ) -> Outcome<Product> {
        self.try_register_product(product, ctx).await.into()
    }

    async fn try_register_product(
        &self,
        product: Product,
        ctx: &CorrelationContext,
    ) -> Result<Product, DomainError> {
        if product.id.trim().is_empty() {
            return Err(DomainError::Validation("product id is required".into()));
        }
        if product.minimum_stock < 0 || product.current_stock < 0 {
            return Err(DomainError::Validation(
                "stock levels cannot be negative".into(),
            ));
        }

        let id = product.document_id();
        let registered = InventoryEvent::ProductRegistered(ProductRegistered {
            product: product.clone(),
        });
        self.recorder
            .record_next::<Product>(&id, &registered, ctx)
            .await?;
        self.products
            .put(product.clone(), PutOptions::unconditional())
            .await?;

        info!(product_id = %id, stock = product.current_stock, "Product registered");
        Ok(product)
    }

    /// Writes off stock damaged by a temperature excursion and signals when
    /// the product drops to its minimum.
    ///
    /// Failures for unknown products are recorded but adjust nothing.
    #[tracing::instrument(
        skip(self, failure, ctx),
        fields(event_id = %failure.id, product_id = %failure.product_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn process_cold_chain_failure(
        &self,
        failure: &ColdChainFailureEvent,
        ctx: &CorrelationContext,
    ) -> Outcome<ColdChainProcessed> {
        let started = Instant::now();
        let outcome = self.try_process_cold_chain_failure(failure, ctx).await.into();
        record_duration("process_cold_chain_failure", started);
        outcome
    }

    async fn try_process_cold_chain_failure(
        &self,
        failure: &ColdChainFailureEvent,
        ctx: &CorrelationContext,
    ) -> Result<ColdChainProcessed, DomainError> {
        let product_id = AggregateId::from(failure.product_id.as_str());
        let movement_id = AggregateId::derived_from("loss", &failure.id);
        let history = self
            .recorder
            .store()
            .get_events_for_aggregate(&product_id)
            .await?;

        if let Some(recorded) = find_movement(&history, &movement_id)? {
            info!(movement_id = %movement_id, "Cold-chain failure already applied");
            self.restore_if_latest(&history, &recorded).await?;
            let stock_low_event = stock_low_for(&recorded, failure, ctx);
            return Ok(ColdChainProcessed {
                movement: Some(recorded.movement),
                stock_low_event,
                duplicate: true,
            });
        }

        let already_recorded = failure_recorded(&history, &failure.id)?;
        if !already_recorded {
            let event = InventoryEvent::ColdChainFailureRecorded(ColdChainFailureRecorded {
                failure: failure.clone(),
            });
            self.recorder
                .record_next::<Product>(&product_id, &event, ctx)
                .await?;
        }

        let Some(Versioned {
            revision,
            document: mut product,
        }) = self.products.get(&product_id).await?
        else {
            warn!("Cold-chain failure for unknown product, no stock adjusted");
            return Ok(ColdChainProcessed {
                duplicate: already_recorded,
                ..Default::default()
            });
        };

        let lost = loss_quantity(product.current_stock, &failure.severity);
        if lost <= 0 {
            info!("No stock lost");
            return Ok(ColdChainProcessed {
                duplicate: already_recorded,
                ..Default::default()
            });
        }

        let mut metadata = Map::new();
        metadata.insert("failure_event_id".into(), Value::String(failure.id.clone()));
        metadata.insert("temperature".into(), failure.temperature.into());
        metadata.insert("threshold".into(), failure.threshold_temperature.into());
        metadata.insert(
            "severity".into(),
            Value::String(failure.severity.as_str().to_string()),
        );
        let movement = InventoryMovement {
            id: movement_id,
            product_id: failure.product_id.clone(),
            product_name: failure.product_name.clone(),
            movement_type: MovementType::Loss,
            quantity: lost,
            location: failure.location.clone(),
            timestamp: Utc::now(),
            reason: format!("Cold chain failure - temperature: {}°C", failure.temperature),
            metadata,
        };
        product.apply(&movement);

        let recorded = self
            .record_movement(&product_id, movement, product, revision, ctx)
            .await?;

        info!(
            lost,
            stock = recorded.product.current_stock,
            "Stock written off after cold-chain failure"
        );
        let stock_low_event = stock_low_for(&recorded, failure, ctx);
        if let Some(signal) = &stock_low_event {
            info!(stock_low_event_id = %signal.id, urgency = %signal.urgency_level, "Stock low");
        }

        Ok(ColdChainProcessed {
            movement: Some(recorded.movement),
            stock_low_event,
            duplicate: false,
        })
    }

    /// Books delivered goods into stock.
    #[tracing::instrument(
        skip(self, received, ctx),
        fields(event_id = %received.id, product_id = %received.product_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn process_inventory_received(
        &self,
        received: &InventoryReceivedEvent,
        ctx: &CorrelationContext,
    ) -> Outcome<ReceiptProcessed> {
        let started = Instant::now();
        let outcome = self.try_process_inventory_received(received, ctx).await.into();
        record_duration("process_inventory_received", started);
        outcome
    }

    async fn try_process_inventory_received(
        &self,
        received: &InventoryReceivedEvent,
        ctx: &CorrelationContext,
    ) -> Result<ReceiptProcessed, DomainError> {
        if received.quantity <= 0 {
            return Err(DomainError::Validation(format!(
                "received quantity must be positive, got {}",
                received.quantity
            )));
        }

        let product_id = AggregateId::from(received.product_id.as_str());
        let movement_id = AggregateId::derived_from("receipt", &received.id);
        let history = self
            .recorder
            .store()
            .get_events_for_aggregate(&product_id)
            .await?;

        if let Some(recorded) = find_movement(&history, &movement_id)? {
            info!(movement_id = %movement_id, "Receipt already booked");
            self.restore_if_latest(&history, &recorded).await?;
            return Ok(ReceiptProcessed {
                movement: recorded.movement,
                product: recorded.product,
                duplicate: true,
            });
        }

        let Versioned {
            revision,
            document: mut product,
        } = self
            .products
            .get(&product_id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: Product::aggregate_type(),
                aggregate_id: product_id.to_string(),
            })?;

        let mut metadata = Map::new();
        metadata.insert(
            "inventory_received_event_id".into(),
            Value::String(received.id.clone()),
        );
        metadata.insert(
            "purchase_order_id".into(),
            Value::String(received.purchase_order_id.clone()),
        );
        metadata.insert(
            "batch_number".into(),
            Value::String(received.batch_number.clone()),
        );
        let movement = InventoryMovement {
            id: movement_id,
            product_id: received.product_id.clone(),
            product_name: received.product_name.clone(),
            movement_type: MovementType::In,
            quantity: received.quantity,
            location: received.location.clone(),
            timestamp: received.received_at,
            reason: format!(
                "Supplier delivery for purchase order {}",
                received.purchase_order_id
            ),
            metadata,
        };
        product.apply(&movement);

        let recorded = self
            .record_movement(&product_id, movement, product, revision, ctx)
            .await?;
        info!(
            quantity = received.quantity,
            stock = recorded.product.current_stock,
            "Received goods booked into stock"
        );

        Ok(ReceiptProcessed {
            movement: recorded.movement,
            product: recorded.product,
            duplicate: false,
        })
    }

    /// Appends the movement to the log, then updates the product with a
    /// compare-and-swap on the revision it was read at.
    async fn record_movement(
        &self,
        product_id: &AggregateId,
        movement: InventoryMovement,
        product: Product,
        revision: Version,
        ctx: &CorrelationContext,
    ) -> Result<MovementRecorded, DomainError> {
        let recorded = MovementRecorded { movement, product };
        let event = InventoryEvent::MovementRecorded(recorded.clone());
        self.recorder
            .record_next::<Product>(product_id, &event, ctx)
            .await?;
        self.products
            .put(
                recorded.product.clone(),
                PutOptions::expect_revision(revision),
            )
            .await?;

        metrics::counter!(
            "stock_movements_total",
            "movement_type" => recorded.movement.movement_type.as_str()
        )
        .increment(1);
        Ok(recorded)
    }

    /// Re-publishes a movement's product snapshot when an earlier attempt
    /// logged the movement but never reached the read model.
    async fn restore_if_latest(
        &self,
        history: &[EventRecord],
        recorded: &MovementRecorded,
    ) -> Result<(), DomainError> {
        let latest = history
            .iter()
            .rev()
            .find(|record| record.event_type == INVENTORY_MOVEMENT_RECORDED);
        let Some(latest) = latest else {
            return Ok(());
        };
        let latest: MovementRecorded = latest.data()?;
        if latest.movement.id != recorded.movement.id {
            return Ok(());
        }

        let id = recorded.product.document_id();
        let current = self.products.get(&id).await?;
        let stale = match &current {
            Some(current) => {
                current.document.last_movement_id() != Some(recorded.movement.id.as_str())
            }
            None => true,
        };
        if stale {
            warn!(product_id = %id, "Restoring product from its last recorded movement");
            let options = match current {
                Some(current) => PutOptions::expect_revision(current.revision),
                None => PutOptions::expect_new(),
            };
            self.products.put(recorded.product.clone(), options).await?;
        }
        Ok(())
    }
}

fn find_movement(
    history: &[EventRecord],
    movement_id: &AggregateId,
) -> Result<Option<MovementRecorded>, DomainError> {
    for record in history
        .iter()
        .filter(|r| r.event_type == INVENTORY_MOVEMENT_RECORDED)
    {
        let recorded: MovementRecorded = record.data()?;
        if &recorded.movement.id == movement_id {
            return Ok(Some(recorded));
        }
    }
    Ok(None)
}

fn failure_recorded(history: &[EventRecord], failure_id: &str) -> Result<bool, DomainError> {
    for record in history
        .iter()
        .filter(|r| r.event_type == COLD_CHAIN_FAILURE_RECORDED)
    {
        let recorded: ColdChainFailureRecorded = record.data()?;
        if recorded.failure.id == failure_id {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Builds the stock-low signal for a loss, if the product is now low.
///
/// Id and timestamp come from the movement so a replay emits the same event.
fn stock_low_for(
    recorded: &MovementRecorded,
    failure: &ColdChainFailureEvent,
    ctx: &CorrelationContext,
) -> Option<StockLowEvent> {
    let product = &recorded.product;
    if !product.is_low() {
        return None;
    }

    let mut metadata = Map::new();
    ctx.stamp(&mut metadata);
    metadata.insert(
        "last_movement_id".into(),
        Value::String(recorded.movement.id.to_string()),
    );
    metadata.insert(
        "cold_chain_failure_id".into(),
        Value::String(failure.id.clone()),
    );
    metadata.insert("temperature".into(), failure.temperature.into());
    metadata.insert(
        "temperature_controlled".into(),
        Value::Bool(product.temperature_controlled),
    );

    Some(StockLowEvent {
        id: AggregateId::derived_from("stock-low", recorded.movement.id.as_str()).into_string(),
        timestamp: recorded.movement.timestamp,
        event_type: event_types::STOCK_LOW.to_string(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        current_stock: product.current_stock,
        minimum_stock: product.minimum_stock,
        location: product.location.clone(),
        urgency_level: classify_urgency(product.current_stock, product.minimum_stock),
        metadata,
    })
}

fn record_duration(command: &'static str, started: Instant) {
    metrics::histogram!("command_duration_seconds", "command" => command)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Severity, UrgencyLevel};
    use event_store::{EventStoreExt, InMemoryEventStore, InMemoryReadModelStore};

    type Processor = InventoryProcessor<InMemoryEventStore, InMemoryReadModelStore<Product>>;

    fn setup() -> (Processor, InMemoryEventStore, InMemoryReadModelStore<Product>) {
        let events = InMemoryEventStore::new();
        let products = InMemoryReadModelStore::new();
        (
            InventoryProcessor::new(events.clone(), products.clone()),
            events,
            products,
        )
    }

    fn product(stock: i64, minimum: i64) -> Product {
        Product {
            id: "P1".into(),
            name: "Vaccine".into(),
            current_stock: stock,
            minimum_stock: minimum,
            maximum_stock: 500,
            location: "warehouse-a".into(),
            temperature_controlled: true,
            last_updated: Utc::now(),
            metadata: Map::new(),
        }
    }

    fn failure(severity: Severity) -> ColdChainFailureEvent {
        ColdChainFailureEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_types::COLD_CHAIN_FAILURE.to_string(),
            product_id: "P1".into(),
            product_name: "Vaccine".into(),
            temperature: 9.5,
            threshold_temperature: 8.0,
            location: "warehouse-a".into(),
            severity,
            metadata: Map::new(),
        }
    }

    fn received(quantity: i64) -> InventoryReceivedEvent {
        InventoryReceivedEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_types::INVENTORY_RECEIVED.to_string(),
            purchase_order_id: "po-1".into(),
            product_id: "P1".into(),
            product_name: "Vaccine".into(),
            quantity,
            supplier_id: "supplier-001".into(),
            supplier_name: "Default Supplier".into(),
            location: "warehouse-a".into(),
            status: "received".into(),
            received_at: Utc::now(),
            quality_check: "passed".into(),
            temperature: Some(2.5),
            batch_number: "BATCH-1a2b3c4d".into(),
            expiry_date: None,
            metadata: Map::new(),
        }
    }

    fn ctx() -> CorrelationContext {
        CorrelationContext::new("corr-1", "cause-1")
    }

    #[tokio::test]
    async fn critical_failure_halves_stock_and_signals_low() {
        let (processor, _, products) = setup();
        processor.register_product(product(20, 10), &ctx()).await.ok().unwrap();

        let result = processor
            .process_cold_chain_failure(&failure(Severity::Critical), &ctx())
            .await
            .ok()
            .unwrap();

        let movement = result.movement.unwrap();
        assert_eq!(movement.movement_type, MovementType::Loss);
        assert_eq!(movement.quantity, 10);

        let signal = result.stock_low_event.unwrap();
        assert_eq!(signal.current_stock, 10);
        assert_eq!(signal.minimum_stock, 10);
        assert_eq!(signal.urgency_level, UrgencyLevel::Medium);
        assert_eq!(signal.metadata["last_movement_id"], movement.id.as_str());
        assert_eq!(signal.metadata["temperature_controlled"], true);
        assert_eq!(signal.metadata["correlation_id"], "corr-1");

        let stored = products.get(&AggregateId::from("P1")).await.unwrap().unwrap();
        assert_eq!(stored.document.current_stock, 10);
    }

    #[tokio::test]
    async fn minor_failure_above_minimum_emits_nothing() {
        let (processor, _, _) = setup();
        processor.register_product(product(100, 10), &ctx()).await.ok().unwrap();

        let result = processor
            .process_cold_chain_failure(&failure(Severity::Low), &ctx())
            .await
            .ok()
            .unwrap();
        assert_eq!(result.movement.unwrap().quantity, 5);
        assert!(result.stock_low_event.is_none());
    }

    #[tokio::test]
    async fn unknown_product_records_failure_only() {
        let (processor, events, _) = setup();

        let result = processor
            .process_cold_chain_failure(&failure(Severity::High), &ctx())
            .await
            .ok()
            .unwrap();
        assert!(result.movement.is_none());
        assert!(result.stock_low_event.is_none());

        let history = events
            .get_events_for_aggregate(&AggregateId::from("P1"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type, COLD_CHAIN_FAILURE_RECORDED);
    }

    #[tokio::test]
    async fn replayed_failure_does_not_double_count() {
        let (processor, events, products) = setup();
        processor.register_product(product(20, 10), &ctx()).await.ok().unwrap();
        let event = failure(Severity::High);

        let first = processor.process_cold_chain_failure(&event, &ctx()).await.ok().unwrap();
        let second = processor.process_cold_chain_failure(&event, &ctx()).await.ok().unwrap();

        assert!(second.duplicate);
        assert_eq!(first.stock_low_event, second.stock_low_event);
        let stored = products.get(&AggregateId::from("P1")).await.unwrap().unwrap();
        assert_eq!(stored.document.current_stock, 14);
        // registered + failure + movement
        assert_eq!(
            events.get_aggregate_version(&AggregateId::from("P1")).await.unwrap(),
            Some(Version::new(3))
        );
    }

    #[tokio::test]
    async fn lost_product_write_is_restored_on_replay() {
        let (processor, _, products) = setup();
        processor.register_product(product(20, 10), &ctx()).await.ok().unwrap();
        let event = failure(Severity::Critical);
        processor.process_cold_chain_failure(&event, &ctx()).await.ok().unwrap();

        // Simulate the read-model write never landing.
        products
            .put(product(20, 10), PutOptions::unconditional())
            .await
            .unwrap();

        processor.process_cold_chain_failure(&event, &ctx()).await.ok().unwrap();
        let stored = products.get(&AggregateId::from("P1")).await.unwrap().unwrap();
        assert_eq!(stored.document.current_stock, 10);
    }

    #[tokio::test]
    async fn receipt_adds_stock_once() {
        let (processor, events, _) = setup();
        processor.register_product(product(4, 10), &ctx()).await.ok().unwrap();
        let event = received(40);

        let first = processor.process_inventory_received(&event, &ctx()).await.ok().unwrap();
        assert_eq!(first.product.current_stock, 44);
        assert_eq!(first.movement.movement_type, MovementType::In);

        let replay = processor.process_inventory_received(&event, &ctx()).await.ok().unwrap();
        assert!(replay.duplicate);
        assert_eq!(replay.product.current_stock, 44);
        assert!(
            events
                .aggregate_exists(&AggregateId::from("P1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn receipt_for_unknown_product_is_not_found() {
        let (processor, _, _) = setup();
        let outcome = processor.process_inventory_received(&received(5), &ctx()).await;
        assert!(matches!(outcome, Outcome::NotFound { aggregate_type: "Product", .. }));
    }

    #[tokio::test]
    async fn receipt_with_unavailable_store_is_retryable() {
        let (processor, events, _) = setup();
        processor.register_product(product(4, 10), &ctx()).await.ok().unwrap();
        events.set_unavailable(true);

        let outcome = processor.process_inventory_received(&received(5), &ctx()).await;
        assert!(outcome.is_retryable());
    }
}
