//! HTTP handlers.

pub mod health;
pub mod metrics;
pub mod products;
pub mod purchase_orders;

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: [&'static str; 4],
}

/// GET /: service name and entry points.
pub async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "cold-chain-pipeline",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ["/health", "/metrics", "/purchase-orders", "/products"],
    })
}
