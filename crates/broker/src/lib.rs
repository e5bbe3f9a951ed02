//! Message transport for the cold-chain pipeline.
//!
//! Services talk to three broker technologies through one small surface:
//! - [`Broker`]: declare topology, publish, subscribe
//! - [`Subscription`]: pull deliveries from a queue with bounded prefetch
//! - [`Delivery`]: a message plus its settlement (ack, nack, reject)
//!
//! [`InMemoryBroker`] backs tests and local runs. The AMQP adapter (feature
//! `amqp`, on by default) wraps `lapin`; the Kafka adapter (feature `kafka`)
//! wraps `rdkafka`. [`connect`] picks one from a URL.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod topology;
pub mod transport;

use std::sync::Arc;

pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use message::{Headers, Message, headers};
pub use topology::{Binding, Destination, Exchange, ExchangeKind, QueueSpec, Topology};
pub use transport::{Acknowledger, Broker, Delivery, SharedBroker, Subscription};

/// Opens a broker from its URL.
///
/// - `memory://<name>`: a fresh in-memory broker
/// - `amqp://…` / `amqps://…`: RabbitMQ through `lapin`
/// - `kafka://host:port[,host:port]`: Kafka through `rdkafka`
pub async fn connect(url: &str) -> Result<SharedBroker> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| BrokerError::UnsupportedUrl(url.to_string()))?;

    match scheme {
        "memory" => Ok(Arc::new(InMemoryBroker::named(rest))),
        #[cfg(feature = "amqp")]
        "amqp" | "amqps" => Ok(Arc::new(amqp::AmqpBroker::connect(url).await?)),
        #[cfg(feature = "kafka")]
        "kafka" => Ok(Arc::new(kafka::KafkaBroker::connect(rest)?)),
        _ => Err(BrokerError::UnsupportedUrl(url.to_string())),
    }
}
