//! Integration tests for the HTTP surface over in-memory stores.

use std::sync::{Arc, OnceLock};

use api::{AppState, MemoryBackend, Services, Stores};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::{CorrelationContext, StockLowEvent, UrgencyLevel};
use domain::{Product, PurchaseOrder};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Map, Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    stores: Stores<MemoryBackend>,
    services: Services<MemoryBackend>,
}

fn setup() -> TestApp {
    let stores = Stores::in_memory();
    let services = Services::new(&stores);
    let state = Arc::new(AppState::new(&stores, Arc::clone(&services.purchasing)));
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        stores,
        services,
    }
}

impl TestApp {
    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn order_from_stock_low(&self, current: i64, urgency: UrgencyLevel) -> PurchaseOrder {
        let event = StockLowEvent::new("P1", "Vaccine", current, 10, "warehouse-a", urgency);
        let ctx = CorrelationContext::new("corr-api", &event.id);
        self.services
            .purchasing
            .process_stock_low(&event, &ctx)
            .await
            .ok()
            .unwrap()
            .purchase_order
    }
}

#[tokio::test]
async fn health_reports_each_store() {
    let test = setup();

    let (status, body) = test.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["read_model"], "ok");
    assert_eq!(body["checks"]["event_store"], "ok");
    assert!(body.get("error").is_none());

    test.stores.orders.set_unavailable(true);
    let (status, body) = test.get("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["read_model"], "error");
    assert_eq!(body["checks"]["event_store"], "ok");
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn order_created_from_stock_low_is_served() {
    let test = setup();
    let order = test.order_from_stock_low(3, UrgencyLevel::High).await;

    let (status, body) = test.get(&format!("/purchase-orders/{}", order.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 40);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["product_id"], "P1");

    let (status, events) = test
        .get(&format!("/purchase-orders/{}/events", order.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "PurchaseOrderCreated");
    assert_eq!(events[0]["version"], 1);
    assert_eq!(events[0]["correlation_id"], "corr-api");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let test = setup();
    let (status, body) = test.get("/purchase-orders/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    let (status, _) = test.get("/purchase-orders/does-not-exist/events").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_applies_filters() {
    let test = setup();
    test.order_from_stock_low(3, UrgencyLevel::High).await;
    test.order_from_stock_low(0, UrgencyLevel::Critical).await;

    let (status, all) = test.get("/purchase-orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, critical) = test.get("/purchase-orders?urgency_level=critical").await;
    let critical = critical.as_array().unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0]["quantity"], 60);

    let (_, limited) = test.get("/purchase-orders?status=pending&limit=1").await;
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let (status, _) = test.get("/purchase-orders?status=shipped").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_updates_move_forward_only() {
    let test = setup();
    let order = test.order_from_stock_low(3, UrgencyLevel::High).await;
    let uri = format!("/purchase-orders/{}/status", order.id);

    let (status, body) = test.post(&uri, json!({ "status": "received" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "received");
    assert!(body["actual_date"].as_str().is_some());

    let (status, _) = test.post(&uri, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = test.post(&uri, json!({ "status": "lost" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = test
        .post("/purchase-orders/missing/status", json!({ "status": "received" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, events) = test
        .get(&format!("/purchase-orders/{}/events", order.id))
        .await;
    assert_eq!(events.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn status_update_during_store_outage_is_unavailable() {
    let test = setup();
    let order = test.order_from_stock_low(3, UrgencyLevel::High).await;
    test.stores.order_events.set_unavailable(true);

    let (status, body) = test
        .post(
            &format!("/purchase-orders/{}/status", order.id),
            json!({ "status": "received" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn manual_order_is_created() {
    let test = setup();
    let (status, body) = test
        .post(
            "/purchase-orders",
            json!({
                "product_id": "P2",
                "product_name": "Insulin",
                "quantity": 25,
                "location": "warehouse-b",
                "urgency_level": "medium",
                "supplier_id": "supplier-042"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["quantity"], 25);
    assert_eq!(body["supplier_id"], "supplier-042");

    let (status, _) = test
        .post(
            "/purchase-orders",
            json!({
                "product_id": "P2",
                "product_name": "Insulin",
                "quantity": 0,
                "location": "warehouse-b",
                "urgency_level": "medium"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_and_overdue() {
    let test = setup();
    test.order_from_stock_low(3, UrgencyLevel::High).await;
    test.order_from_stock_low(0, UrgencyLevel::Critical).await;

    let (status, stats) = test.get("/purchase-orders/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_orders"], 2);
    assert_eq!(stats["pending_orders"], 2);
    assert_eq!(stats["by_urgency"]["critical"], 1);

    // Fresh orders are due in a week.
    let (status, overdue) = test.get("/purchase-orders/overdue").await;
    assert_eq!(status, StatusCode::OK);
    assert!(overdue.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn products_are_served_from_the_inventory_read_model() {
    let test = setup();
    let product = Product {
        id: "P1".into(),
        name: "Vaccine".into(),
        current_stock: 4,
        minimum_stock: 10,
        maximum_stock: 100,
        location: "warehouse-a".into(),
        temperature_controlled: true,
        last_updated: Utc::now(),
        metadata: Map::new(),
    };
    assert!(
        test.services
            .inventory
            .register_product(product, &CorrelationContext::default())
            .await
            .is_ok()
    );

    let (status, body) = test.get("/products/P1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_stock"], 4);

    let (_, low) = test.get("/products?low_stock_only=true").await;
    assert_eq!(low.as_array().unwrap().len(), 1);

    let (status, movements) = test.get("/products/P1/movements").await;
    assert_eq!(status, StatusCode::OK);
    assert!(movements.as_array().unwrap().is_empty());

    let (status, _) = test.get("/products/P9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn service_info_and_metrics() {
    let test = setup();
    test.order_from_stock_low(3, UrgencyLevel::High).await;

    let (status, info) = test.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["service"], "cold-chain-pipeline");

    let response = test
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("purchase_orders_created_total"));
}
