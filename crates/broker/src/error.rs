//! Broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker cannot be reached. Callers may retry.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Unsupported broker URL: {0}")]
    UnsupportedUrl(String),

    #[error("Subscription closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl BrokerError {
    /// Whether the same operation may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            BrokerError::Unavailable(_) | BrokerError::Closed => true,
            #[cfg(feature = "amqp")]
            BrokerError::Amqp(_) => true,
            #[cfg(feature = "kafka")]
            BrokerError::Kafka(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
