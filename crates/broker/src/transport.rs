//! The traits every broker adapter implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::message::Message;
use crate::topology::{Destination, Topology};

pub type SharedBroker = Arc<dyn Broker>;

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Human-readable identity for logs.
    fn name(&self) -> &str;

    /// Declares exchanges, queues and bindings. Idempotent.
    async fn declare(&self, topology: &Topology) -> Result<()>;

    /// Publishes and waits for the broker to confirm.
    async fn publish(&self, destination: &Destination, message: Message) -> Result<()>;

    /// Starts consuming a declared queue with at most `prefetch` unsettled deliveries.
    async fn subscribe(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Subscription>>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Subscription: Send {
    fn queue(&self) -> &str;

    /// Waits for the next delivery. `None` once the subscription has ended.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no message.
    async fn next(&mut self) -> Option<Result<Delivery>>;

    /// Stops consuming. Unsettled deliveries return to the queue.
    async fn close(&mut self) -> Result<()>;
}

/// Settles one delivery with the broker that produced it.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgement. `requeue` puts the message back for redelivery.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A received message awaiting settlement.
pub struct Delivery {
    pub message: Message,
    /// The broker has delivered this message before.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: Message, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            message,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }

    /// Drops the message for good.
    pub async fn reject(self) -> Result<()> {
        self.acker.nack(false).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
