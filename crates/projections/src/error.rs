//! Read-side error types.

use thiserror::Error;

/// Errors raised while replaying events into a read model.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored event could not be decoded.
    #[error("Event decoding error: {0}")]
    Domain(#[from] domain::DomainError),

    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
