//! Supplier service: turns a pending reception into received inventory.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{
    AggregateId, CorrelationContext, InventoryReceivedEvent, SupplierReceptionEvent, event_types,
};
use event_store::{Document, EventStore, PutOptions, ReadModelStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::EventRecorder;
use crate::error::DomainError;
use crate::outcome::Outcome;

pub const SUPPLIER_RECEPTION_PROCESSED: &str = "SupplierReceptionProcessed";

/// Shelf life assigned to received goods.
pub const SHELF_LIFE_DAYS: i64 = 30;
/// Arrival reading recorded for refrigerated goods.
pub const REFRIGERATED_ARRIVAL_TEMPERATURE: f64 = 2.5;

/// A processed delivery, keyed by the reception event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierReception {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub supplier_id: String,
    pub received_at: DateTime<Utc>,
    pub quality_check: String,
    pub batch_number: String,
    /// The event emitted for this reception, replayed verbatim on duplicates.
    pub inventory_received: InventoryReceivedEvent,
}

impl Document for SupplierReception {
    fn document_id(&self) -> AggregateId {
        AggregateId::from(self.id.as_str())
    }
}

impl Aggregate for SupplierReception {
    type Event = ReceptionEvent;

    fn aggregate_type() -> &'static str {
        "SupplierReception"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionEvent {
    pub reception: SupplierReception,
}

impl DomainEvent for ReceptionEvent {
    fn event_type(&self) -> &'static str {
        SUPPLIER_RECEPTION_PROCESSED
    }
}

#[derive(Debug, Clone)]
pub struct ReceptionProcessed {
    pub inventory_received: InventoryReceivedEvent,
    pub duplicate: bool,
}

/// Write side of the supplier service.
pub struct ReceptionProcessor<E, R>
where
    E: EventStore,
    R: ReadModelStore<SupplierReception>,
{
    recorder: EventRecorder<E>,
    receptions: R,
}

impl<E, R> ReceptionProcessor<E, R>
where
    E: EventStore,
    R: ReadModelStore<SupplierReception>,
{
    pub fn new(event_store: E, receptions: R) -> Self {
        Self {
            recorder: EventRecorder::new(event_store),
            receptions,
        }
    }

    pub fn receptions(&self) -> &R {
        &self.receptions
    }

    /// Checks in a delivery and produces the inventory-received event.
    #[tracing::instrument(
        skip(self, reception, ctx),
        fields(event_id = %reception.id, purchase_order_id = %reception.purchase_order_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn process_reception(
        &self,
        reception: &SupplierReceptionEvent,
        ctx: &CorrelationContext,
    ) -> Outcome<ReceptionProcessed> {
        let started = Instant::now();
        let outcome = self.try_process_reception(reception, ctx).await.into();
        metrics::histogram!("command_duration_seconds", "command" => "process_reception")
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn try_process_reception(
        &self,
        reception: &SupplierReceptionEvent,
        ctx: &CorrelationContext,
    ) -> Result<ReceptionProcessed, DomainError> {
        if reception.purchase_order_id.trim().is_empty() {
            return Err(DomainError::Validation(
                "reception has no purchase order id".into(),
            ));
        }
        if reception.quantity <= 0 {
            return Err(DomainError::Validation(format!(
                "reception quantity must be positive, got {}",
                reception.quantity
            )));
        }

        let id = AggregateId::from(reception.id.as_str());
        if let Some(existing) = self.receptions.get(&id).await? {
            info!("Reception already processed");
            return Ok(ReceptionProcessed {
                inventory_received: existing.document.inventory_received,
                duplicate: true,
            });
        }

        let document = match self.first_recorded(&id).await? {
            Some(recorded) => recorded,
            None => {
                let document = check_in(reception, ctx, Utc::now());
                let event = ReceptionEvent {
                    reception: document.clone(),
                };
                match self
                    .recorder
                    .record_first::<SupplierReception>(&id, &event, ctx)
                    .await
                {
                    Ok(_) => document,
                    Err(DomainError::EventStore(err)) if err.is_conflict() => {
                        self.first_recorded(&id).await?.ok_or(err)?
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        match self
            .receptions
            .put(document.clone(), PutOptions::expect_new())
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_conflict() => {}
            Err(err) => return Err(err.into()),
        }

        info!(
            inventory_received_event_id = %document.inventory_received.id,
            batch_number = %document.batch_number,
            "Reception processed"
        );
        Ok(ReceptionProcessed {
            inventory_received: document.inventory_received,
            duplicate: false,
        })
    }

    async fn first_recorded(
        &self,
        id: &AggregateId,
    ) -> Result<Option<SupplierReception>, DomainError> {
        let events = self.recorder.store().get_events_for_aggregate(id).await?;
        match events.first() {
            Some(record) => Ok(Some(record.data::<ReceptionEvent>()?.reception)),
            None => Ok(None),
        }
    }
}

/// Builds the reception record and the event announcing the goods.
///
/// The outgoing id is derived from the reception event id and the batch
/// number from that id.
pub fn check_in(
    reception: &SupplierReceptionEvent,
    ctx: &CorrelationContext,
    now: DateTime<Utc>,
) -> SupplierReception {
    let id = AggregateId::derived_from("inventory-received", &reception.id).into_string();
    let batch_number = format!("BATCH-{}", &id.replace('-', "")[..8]);

    let mut metadata = Map::new();
    ctx.stamp(&mut metadata);
    metadata.insert(
        "purchase_order_id".into(),
        Value::String(reception.purchase_order_id.clone()),
    );
    metadata.insert(
        "reception_event_id".into(),
        Value::String(reception.id.clone()),
    );

    let inventory_received = InventoryReceivedEvent {
        id,
        timestamp: now,
        event_type: event_types::INVENTORY_RECEIVED.to_string(),
        purchase_order_id: reception.purchase_order_id.clone(),
        product_id: reception.product_id.clone(),
        product_name: reception.product_name.clone(),
        quantity: reception.quantity,
        supplier_id: reception.supplier_id.clone(),
        supplier_name: reception.supplier_name.clone(),
        location: reception.location.clone(),
        status: "received".into(),
        received_at: now,
        quality_check: "passed".into(),
        temperature: reception
            .is_temperature_controlled()
            .then_some(REFRIGERATED_ARRIVAL_TEMPERATURE),
        batch_number: batch_number.clone(),
        expiry_date: Some(now + Duration::days(SHELF_LIFE_DAYS)),
        metadata,
    };

    SupplierReception {
        id: reception.id.clone(),
        purchase_order_id: reception.purchase_order_id.clone(),
        product_id: reception.product_id.clone(),
        quantity: reception.quantity,
        supplier_id: reception.supplier_id.clone(),
        received_at: now,
        quality_check: inventory_received.quality_check.clone(),
        batch_number,
        inventory_received,
    }
}
