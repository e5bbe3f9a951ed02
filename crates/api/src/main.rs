//! `pipeline` entry point.

use api::config::{Config, LogFormat, StoreBackend};
use api::error::StartupError;
use api::{Stores, serve};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        backend = ?config.store_backend,
        stages = ?config.pipeline.stages,
        "starting pipeline service"
    );

    match (config.store_backend, config.database_url.clone()) {
        (StoreBackend::Postgres, Some(url)) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            event_store::run_migrations(&pool).await?;
            serve(config, Stores::postgres(pool), metrics_handle).await
        }
        _ => serve(config, Stores::in_memory(), metrics_handle).await,
    }
}
