//! PostgreSQL integration tests.
//!
//! A single container is shared by every test; tables are truncated before
//! each one and the tests run serially.
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration
//! ```

use std::sync::Arc;

use common::CorrelationContext;
use event_store::{
    AggregateId, AppendOptions, Document, EventQuery, EventRecord, EventStore, EventStoreError,
    EventStoreExt, PostgresEventStore, PostgresReadModelStore, PutOptions, ReadModelStore,
    Version, tables,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_service_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(&format!("TRUNCATE TABLE {}", tables::ALL.join(", ")))
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn record(aggregate_id: &str, version: i64, event_type: &str) -> EventRecord {
    EventRecord::new(
        AggregateId::from(aggregate_id),
        "PurchaseOrder",
        event_type,
        serde_json::json!({"purchase_order": {"id": aggregate_id}}),
        Version::new(version),
        &CorrelationContext::new("corr-1", "cause-1"),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderDoc {
    id: String,
    status: String,
}

impl Document for OrderDoc {
    fn document_id(&self) -> AggregateId {
        AggregateId::from(self.id.as_str())
    }
}

#[tokio::test]
#[serial]
async fn append_and_read_back() {
    let store = PostgresEventStore::new(get_test_pool().await, tables::PURCHASE_ORDER_EVENTS);

    store
        .append_event(
            record("po-1", 1, "PurchaseOrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let events = store
        .get_events_for_aggregate(&AggregateId::from("po-1"))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "PurchaseOrderCreated");
    assert_eq!(events[0].correlation_id.as_deref(), Some("corr-1"));
    assert_eq!(events[0].causation_id.as_deref(), Some("cause-1"));
    assert_eq!(events[0].version, Version::first());
}

#[tokio::test]
#[serial]
async fn expected_version_mismatch_is_a_conflict() {
    let store = PostgresEventStore::new(get_test_pool().await, tables::PURCHASE_ORDER_EVENTS);

    store
        .append_event(
            record("po-1", 1, "PurchaseOrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let result = store
        .append_event(
            record("po-1", 2, "PurchaseOrderStatusUpdated"),
            AppendOptions::expect_new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
}

#[tokio::test]
#[serial]
async fn duplicate_version_hits_unique_constraint() {
    let store = PostgresEventStore::new(get_test_pool().await, tables::PURCHASE_ORDER_EVENTS);

    store
        .append_event(record("po-1", 1, "PurchaseOrderCreated"), AppendOptions::new())
        .await
        .unwrap();
    let err = store
        .append_event(record("po-1", 1, "PurchaseOrderCreated"), AppendOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[serial]
async fn query_filters_and_versions() {
    let store = PostgresEventStore::new(get_test_pool().await, tables::PURCHASE_ORDER_EVENTS);

    store
        .append(
            vec![
                record("po-1", 1, "PurchaseOrderCreated"),
                record("po-1", 2, "PurchaseOrderStatusUpdated"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    store
        .append_event(
            record("po-2", 1, "PurchaseOrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let updates = store
        .query_events(EventQuery {
            aggregate_id: Some(AggregateId::from("po-1")),
            event_type: Some("PurchaseOrderStatusUpdated".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].version, Version::new(2));

    let limited = store
        .query_events(EventQuery {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    assert_eq!(
        store
            .get_aggregate_version(&AggregateId::from("po-1"))
            .await
            .unwrap(),
        Some(Version::new(2))
    );

    let streamed: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
    assert_eq!(streamed.len(), 3);
}

#[tokio::test]
#[serial]
async fn tables_are_isolated_per_service() {
    let pool = get_test_pool().await;
    let orders = PostgresEventStore::new(pool.clone(), tables::PURCHASE_ORDER_EVENTS);
    let inventory = PostgresEventStore::new(pool, tables::INVENTORY_EVENTS);

    orders
        .append_event(
            record("po-1", 1, "PurchaseOrderCreated"),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    assert!(
        inventory
            .query_events(EventQuery::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(inventory.ping().await.is_ok());
}

#[tokio::test]
#[serial]
async fn read_model_compare_and_swap() {
    let store: PostgresReadModelStore<OrderDoc> =
        PostgresReadModelStore::new(get_test_pool().await, tables::PURCHASE_ORDER_READ_MODEL);

    let doc = OrderDoc {
        id: "po-1".into(),
        status: "pending".into(),
    };
    let first = store.put(doc.clone(), PutOptions::expect_new()).await.unwrap();
    assert_eq!(first, Version::first());

    let err = store
        .put(doc.clone(), PutOptions::expect_new())
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let received = OrderDoc {
        status: "received".into(),
        ..doc.clone()
    };
    let second = store
        .put(received.clone(), PutOptions::expect_revision(first))
        .await
        .unwrap();
    assert_eq!(second, Version::new(2));

    let stale = store
        .put(doc.clone(), PutOptions::expect_revision(first))
        .await;
    assert!(matches!(
        stale,
        Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
    ));

    let stored = store
        .get(&AggregateId::from("po-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.document, received);

    store.put(doc, PutOptions::unconditional()).await.unwrap();
    let all = store.scan().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].revision, Version::new(3));
}
