//! Idempotent consumer adapter: one broker subscription driving one handler.

use std::time::Duration;

use async_trait::async_trait;
use broker::{Delivery, Message, SharedBroker, headers};
use common::{CorrelationContext, IntegrationEvent};
use tracing::{error, info, warn};

use crate::error::HandlerError;
use crate::retry::{RetryPolicy, RetryTracker};
use crate::shutdown::Shutdown;
use crate::worker::Worker;

/// Pause before pulling again after the broker failed to deliver.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);
/// Pause after requeueing so a failing message does not spin the loop.
const REQUEUE_BACKOFF: Duration = Duration::from_millis(100);

/// Header naming the reason a message was dead-lettered.
pub const DEAD_LETTER_REASON: &str = "x-dead-letter-reason";
/// Header naming the queue a dead-lettered message came from.
pub const ORIGINAL_QUEUE_HEADER: &str = "x-original-queue";

/// Business logic behind one queue.
///
/// Handlers must be idempotent per event id: the consumer delivers at least
/// once and performs no deduplication of its own.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Event: IntegrationEvent;

    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        event: Self::Event,
        ctx: CorrelationContext,
    ) -> Result<(), HandlerError>;
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    /// Dropped without requeue: malformed or permanently failing.
    Rejected,
    Requeued,
    DeadLettered,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Acked => "acked",
            Disposition::Rejected => "rejected",
            Disposition::Requeued => "requeued",
            Disposition::DeadLettered => "dead_lettered",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub queue: String,
    /// Unsettled deliveries allowed at once.
    pub prefetch: u16,
    pub retry: RetryPolicy,
}

impl ConsumerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            prefetch: 1,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Pulls deliveries from a queue, decodes them and settles each one
/// according to the handler's result.
///
/// | Result | Settlement |
/// |---|---|
/// | payload does not decode | reject, never retried |
/// | handler ok | ack |
/// | not found / validation | reject |
/// | store or publish failure | requeue, or dead-letter once the retry cap is reached |
pub struct IdempotentConsumer<H: MessageHandler> {
    broker: SharedBroker,
    config: ConsumerConfig,
    handler: H,
    retries: RetryTracker,
}

impl<H: MessageHandler> IdempotentConsumer<H> {
    pub fn new(broker: SharedBroker, config: ConsumerConfig, handler: H) -> Self {
        Self {
            broker,
            config,
            handler,
            retries: RetryTracker::new(),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Processes and settles one delivery.
    #[tracing::instrument(
        skip(self, delivery),
        fields(
            queue = %self.config.queue,
            handler = self.handler.name(),
            event_id = %delivery.message.id,
            redelivered = delivery.redelivered,
        )
    )]
    pub async fn process(&self, delivery: Delivery) -> broker::Result<Disposition> {
        let ctx = delivery.message.correlation_context();
        let message_id = delivery.message.id.clone();

        let event = match delivery.message.decode::<H::Event>() {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "Malformed payload, rejecting without requeue");
                delivery.reject().await?;
                self.failed("malformed");
                return Ok(self.settled(Disposition::Rejected));
            }
        };

        let result = self.handler.handle(event, ctx.clone()).await;
        let disposition = match result {
            Ok(()) => {
                delivery.ack().await?;
                self.retries.clear(&message_id);
                Disposition::Acked
            }
            Err(err) if err.is_retryable() => {
                self.failed(err.reason());
                let seen = delivery.message.delivery_count();
                let attempts = self.retries.record_failure(&message_id, seen);
                if self.config.retry.is_exhausted(attempts) {
                    self.give_up(delivery, &err, attempts).await?
                } else {
                    warn!(error = %err, attempts, correlation_id = %ctx.correlation_id, "Transient failure, requeueing");
                    delivery.nack(true).await?;
                    Disposition::Requeued
                }
            }
            Err(err) => {
                warn!(error = %err, correlation_id = %ctx.correlation_id, "Message cannot succeed, rejecting");
                self.failed(err.reason());
                delivery.reject().await?;
                self.retries.clear(&message_id);
                Disposition::Rejected
            }
        };
        Ok(self.settled(disposition))
    }

    async fn give_up(
        &self,
        delivery: Delivery,
        err: &HandlerError,
        attempts: u32,
    ) -> broker::Result<Disposition> {
        let message_id = delivery.message.id.clone();
        let Some(destination) = &self.config.retry.dead_letter else {
            error!(error = %err, attempts, "Retry cap reached, dropping message");
            delivery.reject().await?;
            self.retries.clear(&message_id);
            return Ok(Disposition::Rejected);
        };

        let dead = dead_letter(&delivery.message, &self.config.queue, err, attempts);
        if let Err(publish_err) = self.broker.publish(destination, dead).await {
            warn!(error = %publish_err, %destination, "Dead-letter publish failed, requeueing");
            delivery.nack(true).await?;
            return Ok(Disposition::Requeued);
        }

        error!(error = %err, attempts, %destination, "Retry cap reached, message dead-lettered");
        delivery.reject().await?;
        self.retries.clear(&message_id);
        metrics::counter!("messages_dead_lettered_total", "queue" => self.config.queue.clone())
            .increment(1);
        Ok(Disposition::DeadLettered)
    }

    fn settled(&self, disposition: Disposition) -> Disposition {
        metrics::counter!(
            "messages_processed_total",
            "queue" => self.config.queue.clone(),
            "disposition" => disposition.as_str()
        )
        .increment(1);
        disposition
    }

    fn failed(&self, reason: &'static str) {
        metrics::counter!(
            "messages_failed_total",
            "queue" => self.config.queue.clone(),
            "reason" => reason
        )
        .increment(1);
    }
}

fn dead_letter(message: &Message, queue: &str, err: &HandlerError, attempts: u32) -> Message {
    message
        .clone()
        .with_header(DEAD_LETTER_REASON, err.to_string())
        .with_header(ORIGINAL_QUEUE_HEADER, queue)
        .with_header(headers::DELIVERY_COUNT, attempts.to_string())
}

#[async_trait]
impl<H: MessageHandler> Worker for IdempotentConsumer<H> {
    fn name(&self) -> String {
        format!("{}@{}", self.handler.name(), self.config.queue)
    }

    async fn run(&self, mut shutdown: Shutdown) -> crate::Result<()> {
        let mut subscription = self
            .broker
            .subscribe(&self.config.queue, self.config.prefetch)
            .await?;
        info!(queue = %self.config.queue, handler = self.handler.name(), broker = self.broker.name(), "Consumer started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                next = subscription.next() => next,
            };

            match next {
                None => break,
                Some(Ok(delivery)) => {
                    // The in-flight message always finishes, even during shutdown.
                    match self.process(delivery).await {
                        Ok(Disposition::Requeued) => {
                            tokio::select! {
                                _ = shutdown.wait() => break,
                                _ = tokio::time::sleep(REQUEUE_BACKOFF) => {}
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(queue = %self.config.queue, error = %err, "Settlement failed, broker will redeliver");
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(queue = %self.config.queue, error = %err, "Receive failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }

        subscription.close().await?;
        info!(queue = %self.config.queue, "Consumer stopped");
        Ok(())
    }
}
