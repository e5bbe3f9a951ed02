//! Product stock lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use domain::{InventoryMovement, Product};
use projections::ProductFilter;
use serde::Deserialize;

use crate::error::{ApiError, into_result};
use crate::{AppState, Backend};

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub location: Option<String>,
    #[serde(default)]
    pub low_stock_only: bool,
    pub limit: Option<usize>,
}

/// GET /products
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(params): Query<ProductParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = ProductFilter {
        location: params.location,
        low_stock_only: params.low_stock_only,
        limit: params.limit,
    };
    into_result(state.products.list_products(filter).await).map(Json)
}

/// GET /products/{id}
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    into_result(state.products.get_product(&id).await).map(Json)
}

/// GET /products/{id}/movements
pub async fn movements<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<InventoryMovement>>, ApiError> {
    into_result(state.products.get_movements(&id).await).map(Json)
}
