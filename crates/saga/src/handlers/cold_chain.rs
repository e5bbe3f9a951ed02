use std::sync::Arc;

use async_trait::async_trait;
use common::{ColdChainFailureEvent, CorrelationContext};
use domain::{InventoryProcessor, Product};
use event_store::{EventStore, ReadModelStore};

use super::EventPublisher;
use crate::consumer::MessageHandler;
use crate::error::{HandlerError, expect_ok};

/// Stage 1: a cold-chain failure writes off stock and may signal stock-low.
///
/// The first stage starts the correlation chain at the failure event when
/// the inbound message carries none.
pub struct ColdChainHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    processor: Arc<InventoryProcessor<E, R>>,
    stock_low: EventPublisher,
}

impl<E, R> ColdChainHandler<E, R>
where
    E: EventStore,
    R: ReadModelStore<Product>,
{
    pub fn new(processor: Arc<InventoryProcessor<E, R>>, stock_low: EventPublisher) -> Self {
        Self {
            processor,
            stock_low,
        }
    }
}

#[async_trait]
impl<E, R> MessageHandler for ColdChainHandler<E, R>
where
    E: EventStore + 'static,
    R: ReadModelStore<Product> + 'static,
{
    type Event = ColdChainFailureEvent;

    fn name(&self) -> &'static str {
        "cold_chain"
    }

    async fn handle(
        &self,
        event: ColdChainFailureEvent,
        ctx: CorrelationContext,
    ) -> Result<(), HandlerError> {
        let ctx = ctx.or_originate(&event.id);
        let processed = expect_ok(self.processor.process_cold_chain_failure(&event, &ctx).await)?;

        if let Some(stock_low) = processed.stock_low_event {
            self.stock_low.publish(&stock_low, &ctx).await?;
        }
        Ok(())
    }
}
