//! One handler per pipeline stage.

mod cold_chain;
mod inventory_received;
mod reception;
mod stock_low;

pub use cold_chain::ColdChainHandler;
pub use inventory_received::InventoryReceivedHandler;
pub use reception::ReceptionHandler;
pub use stock_low::StockLowHandler;

use broker::{Destination, Message, SharedBroker};
use common::{CorrelationContext, IntegrationEvent};

use crate::error::HandlerError;

/// Publishes a stage's follow-on event.
#[derive(Clone)]
pub struct EventPublisher {
    broker: SharedBroker,
    destination: Destination,
}

impl EventPublisher {
    pub fn new(broker: SharedBroker, destination: Destination) -> Self {
        Self {
            broker,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Publishes `event` with the inbound correlation context unchanged.
    pub async fn publish<E: IntegrationEvent>(
        &self,
        event: &E,
        ctx: &CorrelationContext,
    ) -> Result<(), HandlerError> {
        let message = Message::from_event(event, ctx)
            .map_err(|err| HandlerError::Validation(err.to_string()))?;
        self.broker.publish(&self.destination, message).await?;
        tracing::info!(
            event_id = event.event_id(),
            event_type = E::EVENT_TYPE,
            destination = %self.destination,
            "Event published"
        );
        Ok(())
    }
}
