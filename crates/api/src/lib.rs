//! The `pipeline` service: worker loops plus the HTTP surface.
//!
//! One process hosts every stage enabled in its configuration, the
//! health and Prometheus endpoints, and a read-only operator API over the
//! purchase-order and inventory read models.

pub mod config;
pub mod error;
pub mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use broker::{BrokerError, SharedBroker};
use domain::{
    InventoryProcessor, Product, PurchaseOrder, PurchaseOrderProcessor, ReceptionProcessor,
    StaticSupplierDirectory, SupplierReception,
};
use event_store::{
    EventStore, InMemoryEventStore, InMemoryReadModelStore, PostgresEventStore,
    PostgresReadModelStore, ReadModelStore, tables,
};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{InventoryQueries, PurchaseOrderQueries};
use saga::{Brokers, Pipeline};
use sqlx::PgPool;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use config::Config;
use error::StartupError;

/// The store implementations one process runs on.
pub trait Backend: Send + Sync + 'static {
    type Events: EventStore + Clone + 'static;
    type Products: ReadModelStore<Product> + Clone + 'static;
    type Orders: ReadModelStore<PurchaseOrder> + Clone + 'static;
    type Receptions: ReadModelStore<SupplierReception> + Clone + 'static;
}

pub struct MemoryBackend;

impl Backend for MemoryBackend {
    type Events = InMemoryEventStore;
    type Products = InMemoryReadModelStore<Product>;
    type Orders = InMemoryReadModelStore<PurchaseOrder>;
    type Receptions = InMemoryReadModelStore<SupplierReception>;
}

pub struct PostgresBackend;

impl Backend for PostgresBackend {
    type Events = PostgresEventStore;
    type Products = PostgresReadModelStore<Product>;
    type Orders = PostgresReadModelStore<PurchaseOrder>;
    type Receptions = PostgresReadModelStore<SupplierReception>;
}

/// Event log and read model of each service.
pub struct Stores<B: Backend> {
    pub inventory_events: B::Events,
    pub products: B::Products,
    pub order_events: B::Events,
    pub orders: B::Orders,
    pub supplier_events: B::Events,
    pub receptions: B::Receptions,
}

impl Stores<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self {
            inventory_events: InMemoryEventStore::new(),
            products: InMemoryReadModelStore::new(),
            order_events: InMemoryEventStore::new(),
            orders: InMemoryReadModelStore::new(),
            supplier_events: InMemoryEventStore::new(),
            receptions: InMemoryReadModelStore::new(),
        }
    }
}

impl Stores<PostgresBackend> {
    /// Stores over the tables created by the workspace migrations.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            inventory_events: PostgresEventStore::new(pool.clone(), tables::INVENTORY_EVENTS),
            products: PostgresReadModelStore::new(pool.clone(), tables::INVENTORY_READ_MODEL),
            order_events: PostgresEventStore::new(pool.clone(), tables::PURCHASE_ORDER_EVENTS),
            orders: PostgresReadModelStore::new(pool.clone(), tables::PURCHASE_ORDER_READ_MODEL),
            supplier_events: PostgresEventStore::new(pool.clone(), tables::SUPPLIER_EVENTS),
            receptions: PostgresReadModelStore::new(pool, tables::SUPPLIER_READ_MODEL),
        }
    }
}

pub type Purchasing<B> = PurchaseOrderProcessor<
    <B as Backend>::Events,
    <B as Backend>::Orders,
    StaticSupplierDirectory,
>;

/// The command processors of all three services.
pub struct Services<B: Backend> {
    pub inventory: Arc<InventoryProcessor<B::Events, B::Products>>,
    pub purchasing: Arc<Purchasing<B>>,
    pub supplier: Arc<ReceptionProcessor<B::Events, B::Receptions>>,
}

impl<B: Backend> Services<B> {
    pub fn new(stores: &Stores<B>) -> Self {
        Self {
            inventory: Arc::new(InventoryProcessor::new(
                stores.inventory_events.clone(),
                stores.products.clone(),
            )),
            purchasing: Arc::new(PurchaseOrderProcessor::new(
                stores.order_events.clone(),
                stores.orders.clone(),
                StaticSupplierDirectory::default(),
            )),
            supplier: Arc::new(ReceptionProcessor::new(
                stores.supplier_events.clone(),
                stores.receptions.clone(),
            )),
        }
    }
}

/// Shared state of the HTTP handlers.
pub struct AppState<B: Backend> {
    pub orders: PurchaseOrderQueries<B::Orders, B::Events>,
    pub products: InventoryQueries<B::Products, B::Events>,
    pub purchasing: Arc<Purchasing<B>>,
}

impl<B: Backend> AppState<B> {
    pub fn new(stores: &Stores<B>, purchasing: Arc<Purchasing<B>>) -> Self {
        Self {
            orders: PurchaseOrderQueries::new(stores.orders.clone(), stores.order_events.clone()),
            products: InventoryQueries::new(
                stores.products.clone(),
                stores.inventory_events.clone(),
            ),
            purchasing,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: Backend>(state: Arc<AppState<B>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/", get(routes::info))
        .route("/health", get(routes::health::check::<B>))
        .route(
            "/purchase-orders",
            get(routes::purchase_orders::list::<B>).post(routes::purchase_orders::create::<B>),
        )
        .route(
            "/purchase-orders/overdue",
            get(routes::purchase_orders::overdue::<B>),
        )
        .route("/purchase-orders/stats", get(routes::purchase_orders::stats::<B>))
        .route("/purchase-orders/{id}", get(routes::purchase_orders::get::<B>))
        .route(
            "/purchase-orders/{id}/events",
            get(routes::purchase_orders::events::<B>),
        )
        .route(
            "/purchase-orders/{id}/status",
            post(routes::purchase_orders::update_status::<B>),
        )
        .route("/products", get(routes::products::list::<B>))
        .route("/products/{id}", get(routes::products::get::<B>))
        .route(
            "/products/{id}/movements",
            get(routes::products::movements::<B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Runs the configured pipeline stages and the HTTP listener until a
/// shutdown signal arrives.
///
/// On shutdown the listener stops accepting, the workers finish their
/// in-flight message, and the broker connections close.
pub async fn serve<B: Backend>(
    config: Config,
    stores: Stores<B>,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let brokers = connect_brokers(&config).await?;
    let services = Services::new(&stores);

    let (trigger, shutdown) = saga::shutdown::channel();
    let pipeline = Pipeline::new(config.pipeline.clone(), brokers)
        .with_inventory(Arc::clone(&services.inventory))
        .with_purchase_orders(Arc::clone(&services.purchasing))
        .with_supplier(Arc::clone(&services.supplier))
        .start(shutdown)
        .await?;

    let state = Arc::new(AppState::new(&stores, services.purchasing));
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    metrics::gauge!("pipeline_workers").set(pipeline.worker_count() as f64);
    info!(%addr, workers = pipeline.worker_count(), "Pipeline service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            trigger.trigger();
        })
        .await?;

    pipeline.join().await?;
    info!("Pipeline service shut down gracefully");
    Ok(())
}

/// Connects the three brokers, sharing one connection between equal URLs.
async fn connect_brokers(config: &Config) -> Result<Brokers, BrokerError> {
    let mut connected = HashMap::new();
    let a = connect_once(&mut connected, &config.broker_a_url).await?;
    let b = connect_once(&mut connected, &config.broker_b_url).await?;
    let c = connect_once(&mut connected, &config.broker_c_url).await?;
    Ok(Brokers::new(a, b, c))
}

async fn connect_once(
    connected: &mut HashMap<String, SharedBroker>,
    url: &str,
) -> Result<SharedBroker, BrokerError> {
    if let Some(broker) = connected.get(url) {
        return Ok(Arc::clone(broker));
    }
    let broker = broker::connect(url).await?;
    info!(broker = broker.name(), "Broker connected");
    connected.insert(url.to_string(), Arc::clone(&broker));
    Ok(broker)
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
