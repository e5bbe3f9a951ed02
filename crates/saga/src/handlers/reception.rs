use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationContext, SupplierReceptionEvent};
use domain::{ReceptionProcessor, SupplierReception};
use event_store::{EventStore, ReadModelStore};

use super::EventPublisher;
use crate::consumer::MessageHandler;
use crate::error::{HandlerError, expect_ok};

/// Stage 3: a supplier delivery is checked in and announced as received inventory.
pub struct ReceptionHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<SupplierReception>,
{
    processor: Arc<ReceptionProcessor<E, R>>,
    received: EventPublisher,
}

impl<E, R> ReceptionHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<SupplierReception>,
{
    pub fn new(processor: Arc<ReceptionProcessor<E, R>>, received: EventPublisher) -> Self {
        Self {
            processor,
            received,
        }
    }
}

#[async_trait]
impl<E, R> MessageHandler for ReceptionHandler<E, R>
where
    E: EventStore + 'static,
    R: ReadModelStore<SupplierReception> + 'static,
{
    type Event = SupplierReceptionEvent;

    fn name(&self) -> &'static str {
        "supplier_reception"
    }

    async fn handle(
        &self,
        event: SupplierReceptionEvent,
        ctx: CorrelationContext,
    ) -> Result<(), HandlerError> {
        let processed = expect_ok(self.processor.process_reception(&event, &ctx).await)?;
        self.received
            .publish(&processed.inventory_received, &ctx)
            .await
    }
}
