//! Saga error types.

use broker::BrokerError;
use domain::{DomainError, Outcome};
use thiserror::Error;

/// Errors that stop a worker or the pipeline.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker task panicked or was aborted.
    #[error("Worker '{worker}' failed: {reason}")]
    WorkerFailed { worker: String, reason: String },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Why a handler could not process a message.
///
/// The consumer turns this into a settlement: only [`HandlerError::is_retryable`]
/// errors are requeued.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{aggregate_type} {id} not found")]
    NotFound {
        aggregate_type: &'static str,
        id: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store failure: {0}")]
    Store(DomainError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Store(_) => true,
            HandlerError::Publish(err) => err.is_transient(),
            HandlerError::NotFound { .. } | HandlerError::Validation(_) => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            HandlerError::NotFound { .. } => "not_found",
            HandlerError::Validation(_) => "validation_error",
            HandlerError::Store(_) => "store_error",
            HandlerError::Publish(_) => "publish_error",
        }
    }
}

/// Unwraps a command outcome, classifying everything but `Ok`.
pub fn expect_ok<T>(outcome: Outcome<T>) -> std::result::Result<T, HandlerError> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::NotFound { aggregate_type, id } => {
            Err(HandlerError::NotFound { aggregate_type, id })
        }
        Outcome::ValidationError(message) => Err(HandlerError::Validation(message)),
        Outcome::StoreError(err) => Err(HandlerError::Store(err)),
    }
}
