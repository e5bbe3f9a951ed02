//! Cross-broker bridge: relays one event type from a queue on one broker to
//! an exchange on another.

use std::time::Duration;

use async_trait::async_trait;
use broker::{Delivery, Destination, Message, SharedBroker, headers};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::shutdown::Shutdown;
use crate::state::RelayState;
use crate::worker::Worker;

const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);
/// Pause after handing a message back to the source while the target is down.
const REQUEUE_BACKOFF: Duration = Duration::from_millis(100);

/// A fixed relay: which event type, from which source queue, to where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRoute {
    /// Metric label, e.g. `stock_bajo_a_to_b`.
    pub name: String,
    pub event_type: String,
    pub source_queue: String,
    pub target: Destination,
}

pub struct Bridge {
    source: SharedBroker,
    target: SharedBroker,
    route: BridgeRoute,
    prefetch: u16,
}

impl Bridge {
    pub fn new(source: SharedBroker, target: SharedBroker, route: BridgeRoute) -> Self {
        Self {
            source,
            target,
            route,
            prefetch: 1,
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn route(&self) -> &BridgeRoute {
        &self.route
    }

    /// Relays one delivery and settles it at the source.
    ///
    /// The source message is acknowledged only after the target confirmed the
    /// publish. If that acknowledgement fails the message comes back and is
    /// published twice; consumers dedupe by event id.
    #[tracing::instrument(skip(self, delivery), fields(route = %self.route.name, event_id = %delivery.message.id))]
    pub async fn relay(&self, delivery: Delivery) -> broker::Result<RelayState> {
        let mut state = RelayState::Received;

        let relayed = match transform(&delivery.message, &self.route.event_type) {
            Ok(message) => {
                state = state.advance();
                message
            }
            Err(reason) => {
                error!(%reason, "Unrelayable payload, rejecting");
                delivery.reject().await?;
                return Ok(self.count(state.fail(true)));
            }
        };

        if let Err(err) = self.target.publish(&self.route.target, relayed).await {
            warn!(error = %err, target = self.target.name(), "Target publish failed, requeueing at source");
            delivery.nack(true).await?;
            return Ok(self.count(state.fail(false)));
        }
        state = state.advance();

        match delivery.ack().await {
            Ok(()) => state = state.advance(),
            Err(err) => {
                warn!(error = %err, "Source ack failed after publish, a duplicate will follow");
            }
        }
        Ok(self.count(state))
    }

    fn count(&self, state: RelayState) -> RelayState {
        metrics::counter!(
            "bridge_messages_total",
            "route" => self.route.name.clone(),
            "state" => state.as_str()
        )
        .increment(1);
        state
    }
}

/// Builds the target-side message.
///
/// The payload is passed through byte for byte. Identity comes from the
/// payload's `id`, and the correlation headers are copied over.
pub fn transform(source: &Message, event_type: &str) -> Result<Message, String> {
    let payload: Value =
        serde_json::from_slice(&source.payload).map_err(|err| format!("not JSON: {err}"))?;
    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or("payload has no id")?;

    let declared = source
        .event_type()
        .or_else(|| payload.get("event_type").and_then(Value::as_str));
    if let Some(declared) = declared
        && declared != event_type
    {
        return Err(format!("expected {event_type}, got {declared}"));
    }

    let mut headers = source.headers.clone();
    headers.remove(headers::DELIVERY_COUNT);
    let message = Message {
        id: id.to_string(),
        payload: source.payload.clone(),
        headers,
        timestamp: source.timestamp,
        persistent: true,
        key: source.key.clone(),
    };
    Ok(message
        .with_correlation(&source.correlation_context())
        .with_header(headers::EVENT_TYPE, event_type)
        .with_header(headers::CONTENT_TYPE, headers::APPLICATION_JSON))
}

#[async_trait]
impl Worker for Bridge {
    fn name(&self) -> String {
        format!("bridge:{}", self.route.name)
    }

    async fn run(&self, mut shutdown: Shutdown) -> crate::Result<()> {
        let mut subscription = self
            .source
            .subscribe(&self.route.source_queue, self.prefetch)
            .await?;
        info!(
            route = %self.route.name,
            source = self.source.name(),
            target = self.target.name(),
            destination = %self.route.target,
            "Bridge started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                next = subscription.next() => next,
            };

            match next {
                None => break,
                Some(Ok(delivery)) => {
                    match self.relay(delivery).await {
                        Ok(RelayState::Received) => {
                            tokio::select! {
                                _ = shutdown.wait() => break,
                                _ = tokio::time::sleep(REQUEUE_BACKOFF) => {}
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(route = %self.route.name, error = %err, "Source settlement failed, message will be redelivered");
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(route = %self.route.name, error = %err, "Receive failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }

        subscription.close().await?;
        info!(route = %self.route.name, "Bridge stopped");
        Ok(())
    }
}
