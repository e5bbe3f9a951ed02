//! Tagged result of a command or query.

use crate::error::DomainError;

/// What a command or query produced.
///
/// The four cases drive different decisions at the consumer boundary:
/// only [`Outcome::StoreError`] is worth retrying, the others are final.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    /// The addressed aggregate does not exist.
    NotFound {
        aggregate_type: &'static str,
        id: String,
    },
    /// The input violates a business rule.
    ValidationError(String),
    /// Infrastructure failed; the same input may succeed later.
    StoreError(DomainError),
}

impl<T> Outcome<T> {
    pub fn not_found(aggregate_type: &'static str, id: impl Into<String>) -> Self {
        Outcome::NotFound {
            aggregate_type,
            id: id.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::StoreError(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Ok(_) => "ok",
            Outcome::NotFound { .. } => "not_found",
            Outcome::ValidationError(_) => "validation_error",
            Outcome::StoreError(_) => "store_error",
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::NotFound { aggregate_type, id } => Outcome::NotFound { aggregate_type, id },
            Outcome::ValidationError(message) => Outcome::ValidationError(message),
            Outcome::StoreError(err) => Outcome::StoreError(err),
        }
    }
}

impl<T> From<Result<T, DomainError>> for Outcome<T> {
    fn from(result: Result<T, DomainError>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            }) => Outcome::NotFound {
                aggregate_type,
                id: aggregate_id,
            },
            Err(DomainError::Validation(message)) => Outcome::ValidationError(message),
            Err(DomainError::PurchaseOrder(err)) => Outcome::ValidationError(err.to_string()),
            Err(err) => Outcome::StoreError(err),
        }
    }
}

impl<T> std::fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Ok(_) => write!(f, "ok"),
            Outcome::NotFound { aggregate_type, id } => write!(f, "{aggregate_type} {id} not found"),
            Outcome::ValidationError(message) => write!(f, "validation error: {message}"),
            Outcome::StoreError(err) => write!(f, "store error: {err}"),
        }
    }
}
