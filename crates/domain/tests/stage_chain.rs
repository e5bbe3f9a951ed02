//! Runs the four command processors back to back, the way the pipeline
//! chains them, and checks what each stage hands to the next.

use chrono::{Duration, Utc};
use common::{
    AggregateId, ColdChainFailureEvent, CorrelationContext, Severity, StockLowEvent,
    UrgencyLevel, event_types,
};
use domain::{
    InventoryProcessor, Outcome, Product, PurchaseOrder, PurchaseOrderProcessor,
    PurchaseOrderStatus, ReceptionProcessor, StaticSupplierDirectory, SupplierReception,
};
use event_store::{EventStore, InMemoryEventStore, InMemoryReadModelStore, ReadModelStore};
use serde_json::Map;

struct Services {
    inventory: InventoryProcessor<InMemoryEventStore, InMemoryReadModelStore<Product>>,
    orders: PurchaseOrderProcessor<
        InMemoryEventStore,
        InMemoryReadModelStore<PurchaseOrder>,
        StaticSupplierDirectory,
    >,
    suppliers: ReceptionProcessor<InMemoryEventStore, InMemoryReadModelStore<SupplierReception>>,
    order_events: InMemoryEventStore,
}

fn services() -> Services {
    let order_events = InMemoryEventStore::new();
    Services {
        inventory: InventoryProcessor::new(InMemoryEventStore::new(), InMemoryReadModelStore::new()),
        orders: PurchaseOrderProcessor::new(
            order_events.clone(),
            InMemoryReadModelStore::new(),
            StaticSupplierDirectory::default(),
        ),
        suppliers: ReceptionProcessor::new(InMemoryEventStore::new(), InMemoryReadModelStore::new()),
        order_events,
    }
}

fn vaccine(stock: i64) -> Product {
    Product {
        id: "P1".into(),
        name: "Vaccine".into(),
        current_stock: stock,
        minimum_stock: 10,
        maximum_stock: 200,
        location: "warehouse-a".into(),
        temperature_controlled: true,
        last_updated: Utc::now(),
        metadata: Map::new(),
    }
}

#[tokio::test]
async fn cold_chain_failure_flows_through_every_stage() {
    let s = services();
    let origin = CorrelationContext::default().or_originate("failure-1");
    s.inventory.register_product(vaccine(10), &origin).await.ok().unwrap();

    let failure = ColdChainFailureEvent {
        id: "failure-1".into(),
        timestamp: Utc::now(),
        event_type: event_types::COLD_CHAIN_FAILURE.into(),
        product_id: "P1".into(),
        product_name: "Vaccine".into(),
        temperature: 11.0,
        threshold_temperature: 8.0,
        location: "warehouse-a".into(),
        severity: Severity::Critical,
        metadata: Map::new(),
    };

    // Stage 1: 10 -> 5, half the minimum, urgency high.
    let stage1 = s
        .inventory
        .process_cold_chain_failure(&failure, &origin)
        .await
        .ok()
        .unwrap();
    let stock_low = stage1.stock_low_event.expect("stock should be low");
    assert_eq!(stock_low.current_stock, 5);
    assert_eq!(stock_low.urgency_level, UrgencyLevel::High);

    // Stage 2: 2 × 10 × 2.0.
    let stage2 = s
        .orders
        .process_stock_low(&stock_low, &origin)
        .await
        .ok()
        .unwrap();
    assert_eq!(stage2.purchase_order.quantity, 40);
    assert!(stage2.reception_event.is_temperature_controlled());

    // Stage 3.
    let stage3 = s
        .suppliers
        .process_reception(&stage2.reception_event, &origin)
        .await
        .ok()
        .unwrap();
    let received = stage3.inventory_received;
    assert_eq!(received.purchase_order_id, stage2.purchase_order.id.to_string());
    assert_eq!(received.temperature, Some(2.5));

    // Stage 4.
    let stage4 = s
        .inventory
        .process_inventory_received(&received, &origin)
        .await
        .ok()
        .unwrap();
    assert_eq!(stage4.product.current_stock, 45);

    for metadata in [&stock_low.metadata, &stage2.reception_event.metadata, &received.metadata] {
        assert_eq!(metadata["correlation_id"], "failure-1");
    }
}

#[tokio::test]
async fn high_urgency_reorder_matches_expected_shape() {
    let s = services();
    let event = StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::High);

    let processed = s
        .orders
        .process_stock_low(&event, &CorrelationContext::new("corr", "cause"))
        .await
        .ok()
        .unwrap();

    let order = processed.purchase_order;
    assert_eq!(order.quantity, 40);
    assert_eq!(order.status, PurchaseOrderStatus::Pending);
    assert_eq!(order.expected_date, Some(order.created_at + Duration::days(7)));
    assert_eq!(processed.reception_event.purchase_order_id, order.id.to_string());
}

#[tokio::test]
async fn status_versions_increase_per_order() {
    let s = services();
    let event = StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::Low);
    let ctx = CorrelationContext::new("corr", "cause");
    let id = s
        .orders
        .process_stock_low(&event, &ctx)
        .await
        .ok()
        .unwrap()
        .purchase_order
        .id;

    for status in [PurchaseOrderStatus::Received, PurchaseOrderStatus::Completed] {
        assert!(s.orders.update_status(&id, status, &ctx).await.is_ok());
    }

    let versions: Vec<i64> = s
        .order_events
        .get_events_for_aggregate(&id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version.as_i64())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let stored = s.orders.read_model().get(&id).await.unwrap().unwrap();
    assert_eq!(stored.document.status, PurchaseOrderStatus::Completed);
    assert!(!stored.document.is_overdue_at(Utc::now() + Duration::days(30)));
}

#[tokio::test]
async fn store_outage_is_reported_as_retryable() {
    let s = services();
    s.order_events.set_unavailable(true);
    let event = StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::Low);

    let outcome = s
        .orders
        .process_stock_low(&event, &CorrelationContext::default())
        .await;
    assert!(matches!(outcome, Outcome::StoreError(_)));

    s.order_events.set_unavailable(false);
    let retried = s
        .orders
        .process_stock_low(&event, &CorrelationContext::default())
        .await;
    assert!(retried.is_ok());
    assert!(
        s.orders
            .read_model()
            .get(&AggregateId::derived_from("purchase-order", &event.id))
            .await
            .unwrap()
            .is_some()
    );
}
