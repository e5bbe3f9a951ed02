//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, Outcome};
use event_store::EventStoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// A store is unreachable or a write lost a revision race. Retryable.
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::AggregateNotFound { .. } => ApiError::NotFound(err.to_string()),
            DomainError::Validation(_) | DomainError::PurchaseOrder(_) => {
                ApiError::BadRequest(err.to_string())
            }
            DomainError::EventStore(store) => store_error(store, err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

fn store_error(err: &EventStoreError, message: String) -> ApiError {
    match err {
        EventStoreError::ConcurrencyConflict { .. }
        | EventStoreError::Unavailable(_)
        | EventStoreError::Database(_) => ApiError::Unavailable(message),
        _ => ApiError::Internal(message),
    }
}

/// Turns a query or command outcome into a handler result.
pub fn into_result<T>(outcome: Outcome<T>) -> Result<T, ApiError> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::NotFound { aggregate_type, id } => {
            Err(ApiError::NotFound(format!("{aggregate_type} {id} not found")))
        }
        Outcome::ValidationError(message) => Err(ApiError::BadRequest(message)),
        Outcome::StoreError(err) => Err(err.into()),
    }
}

/// Failures that stop the binary before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics recorder error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Store(#[from] EventStoreError),

    #[error("broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] saga::SagaError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
