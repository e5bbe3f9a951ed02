//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use event_store::{EventStore, ReadModelStore};
use serde::Serialize;

use crate::{AppState, Backend};

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub read_model: &'static str,
    pub event_store: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health: pings the purchase-order stores; 503 if either fails.
pub async fn check<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let read_model = state.orders.read_model().ping().await;
    let event_store = state.orders.event_store().ping().await;

    let label = |ok: bool| if ok { "ok" } else { "error" };
    let checks = HealthChecks {
        read_model: label(read_model.is_ok()),
        event_store: label(event_store.is_ok()),
    };
    let error = [read_model.err(), event_store.err()]
        .into_iter()
        .flatten()
        .map(|err| err.to_string())
        .collect::<Vec<_>>();

    let (status, body_status, error) = if error.is_empty() {
        (StatusCode::OK, "healthy", None)
    } else {
        tracing::warn!(errors = ?error, "health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(error.join("; ")))
    };

    (
        status,
        Json(HealthResponse {
            status: body_status,
            timestamp: Utc::now(),
            checks,
            error,
        }),
    )
}
