use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationContext, StockLowEvent};
use domain::{PurchaseOrder, PurchaseOrderProcessor, SupplierDirectory};
use event_store::{EventStore, ReadModelStore};
use tracing::info;

use super::EventPublisher;
use crate::consumer::MessageHandler;
use crate::error::{HandlerError, expect_ok};

/// Stage 2: a stock-low signal becomes a purchase order and a pending reception.
///
/// A replayed signal re-publishes the same reception event, so a crash
/// between commit and publish heals on redelivery.
pub struct StockLowHandler<E, R, D>
where
    E: EventStore,
    R: ReadModelStore<PurchaseOrder>,
    D: SupplierDirectory,
{
    processor: Arc<PurchaseOrderProcessor<E, R, D>>,
    receptions: EventPublisher,
}

impl<E, R, D> StockLowHandler<E, R, D>
where
    E: EventStore,
    R: ReadModelStore<PurchaseOrder>,
    D: SupplierDirectory,
{
    pub fn new(processor: Arc<PurchaseOrderProcessor<E, R, D>>, receptions: EventPublisher) -> Self {
        Self {
            processor,
            receptions,
        }
    }
}

#[async_trait]
impl<E, R, D> MessageHandler for StockLowHandler<E, R, D>
where
    E: EventStore + 'static,
    R: ReadModelStore<PurchaseOrder> + 'static,
    D: SupplierDirectory + 'static,
{
    type Event = StockLowEvent;

    fn name(&self) -> &'static str {
        "stock_low"
    }

    async fn handle(&self, event: StockLowEvent, ctx: CorrelationContext) -> Result<(), HandlerError> {
        let processed = expect_ok(self.processor.process_stock_low(&event, &ctx).await)?;
        info!(
            purchase_order_id = %processed.purchase_order.id,
            quantity = processed.purchase_order.quantity,
            duplicate = processed.duplicate,
            "Purchase order ready"
        );
        self.receptions
            .publish(&processed.reception_event, &ctx)
            .await
    }
}
