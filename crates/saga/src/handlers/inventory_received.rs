use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationContext, InventoryReceivedEvent};
use domain::{InventoryProcessor, Product};
use event_store::{EventStore, ReadModelStore};
use tracing::info;

use crate::consumer::MessageHandler;
use crate::error::{HandlerError, expect_ok};

/// Stage 4: received goods go back into stock. Ends the chain.
pub struct InventoryReceivedHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    processor: Arc<InventoryProcessor<E, R>>,
}

impl<E, R> InventoryReceivedHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    pub fn new(processor: Arc<InventoryProcessor<E, R>>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl<E, R> MessageHandler for InventoryReceivedHandler<E, R>
where
    E: EventStore + 'static,
    R: ReadModelStore<Product> + 'static,
{
    type Event = InventoryReceivedEvent;

    fn name(&self) -> &'static str {
        "inventory_received"
    }

    async fn handle(
        &self,
        event: InventoryReceivedEvent,
        ctx: CorrelationContext,
    ) -> Result<(), HandlerError> {
        let processed = expect_ok(self.processor.process_inventory_received(&event, &ctx).await)?;
        info!(
            product_id = %processed.product.id,
            stock = processed.product.current_stock,
            duplicate = processed.duplicate,
            "Inventory restocked"
        );
        Ok(())
    }
}
