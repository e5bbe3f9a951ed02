//! Purchase-order queries and the status command.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationContext, UrgencyLevel};
use domain::{CreatePurchaseOrder, PurchaseOrder, PurchaseOrderStatus, Supplier};
use event_store::EventRecord;
use projections::{DateRange, EventHistoryFilter, PurchaseOrderFilter, PurchaseOrderStats};
use serde::Deserialize;

use crate::error::{ApiError, into_result};
use crate::{AppState, Backend};

/// Request header carrying the caller's correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub product_id: Option<String>,
    pub supplier_id: Option<String>,
    pub status: Option<String>,
    pub urgency_level: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ListParams {
    fn into_filter(self) -> Result<PurchaseOrderFilter, ApiError> {
        Ok(PurchaseOrderFilter {
            product_id: self.product_id,
            supplier_id: self.supplier_id,
            status: self.status.as_deref().map(parse_status).transpose()?,
            urgency_level: self.urgency_level.map(UrgencyLevel::from),
            created: DateRange::new(self.start_date, self.end_date),
            limit: self.limit,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    pub event_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub location: String,
    pub urgency_level: String,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// GET /purchase-orders
#[tracing::instrument(skip(state))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PurchaseOrder>>, ApiError> {
    let filter = params.into_filter()?;
    into_result(state.orders.list_purchase_orders(filter).await).map(Json)
}

/// GET /purchase-orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    into_result(state.orders.get_purchase_order(&AggregateId::from(id)).await).map(Json)
}

/// GET /purchase-orders/{id}/events
#[tracing::instrument(skip(state))]
pub async fn events<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
    Query(params): Query<EventParams>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let filter = EventHistoryFilter {
        event_type: params.event_type,
        window: DateRange::new(params.start_time, params.end_time),
        limit: params.limit,
    };
    into_result(
        state
            .orders
            .get_purchase_order_events(&AggregateId::from(id), filter)
            .await,
    )
    .map(Json)
}

/// GET /purchase-orders/overdue
#[tracing::instrument(skip(state))]
pub async fn overdue<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<PurchaseOrder>>, ApiError> {
    into_result(state.orders.get_overdue_purchase_orders().await).map(Json)
}

/// GET /purchase-orders/stats
#[tracing::instrument(skip(state))]
pub async fn stats<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<PurchaseOrderStats>, ApiError> {
    let created = DateRange::new(params.start_date, params.end_date);
    into_result(state.orders.get_statistics(created).await).map(Json)
}

/// POST /purchase-orders: places an order by hand.
#[tracing::instrument(skip(state, headers, req), fields(product_id = %req.product_id))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    Json(req): Json<CreateRequest>,
) -> Result<(StatusCode, Json<PurchaseOrder>), ApiError> {
    let supplier = match (req.supplier_id, req.supplier_name) {
        (Some(id), name) => Some(Supplier::new(id.clone(), name.unwrap_or(id))),
        (None, _) => None,
    };
    let command = CreatePurchaseOrder {
        product_id: req.product_id,
        product_name: req.product_name,
        quantity: req.quantity,
        location: req.location,
        urgency_level: UrgencyLevel::from(req.urgency_level),
        supplier,
    };

    let ctx = request_context(&headers);
    let order = into_result(state.purchasing.create_purchase_order(command, &ctx).await)?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /purchase-orders/{id}/status
#[tracing::instrument(skip(state, headers, req), fields(status = %req.status))]
pub async fn update_status<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusRequest>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let status = parse_status(&req.status)?;
    let ctx = request_context(&headers);
    into_result(
        state
            .purchasing
            .update_status(&AggregateId::from(id), status, &ctx)
            .await,
    )
    .map(Json)
}

fn parse_status(value: &str) -> Result<PurchaseOrderStatus, ApiError> {
    PurchaseOrderStatus::from_str(value).map_err(|err| ApiError::BadRequest(err.to_string()))
}

/// Correlation for a command issued over HTTP: the caller's id if given,
/// otherwise a fresh one.
fn request_context(headers: &HeaderMap) -> CorrelationContext {
    let request_id = uuid::Uuid::new_v4().to_string();
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());
    CorrelationContext::from_headers(correlation_id, Some(&request_id)).or_originate(&request_id)
}
