//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use api::{AppState, create_app, create_in_memory_state};
use fulfillment::{
    ExpirySweeper, FulfillmentService, InMemoryAuditSink, InMemoryGateway,
    InMemoryNotificationSender,
};
use sqlx::postgres::PgPoolOptions;
use store::{AvailabilityCache, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn postgres_state(config: &Config, url: &str) -> Arc<AppState> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to Postgres");
    let store = PostgresStore::new(pool);
    store.run_migrations().await.expect("migrations failed");

    let service = Arc::new(FulfillmentService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        // TODO: wire the real gateway client once its credentials flow is settled
        Arc::new(InMemoryGateway::new()),
        Arc::new(InMemoryNotificationSender::new()),
        Arc::new(InMemoryAuditSink::new()),
        config.fulfillment(),
    ));

    Arc::new(AppState {
        service,
        inventory: Arc::new(store.clone()),
        discounts: Arc::new(store),
        availability_cache: AvailabilityCache::new(Duration::from_secs(
            config.availability_cache_ttl_secs,
        )),
    })
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build application state: Postgres when configured, in-memory otherwise
    let config = Config::from_env();
    let state = match config.database_url.as_deref() {
        Some(url) => postgres_state(&config, url).await,
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let (state, _, _) = create_in_memory_state(&config);
            state
        }
    };

    // 4. Start the expiry sweeper
    let sweeper = ExpirySweeper::new(
        Arc::clone(&state.service),
        Duration::from_secs(config.sweep_interval_secs),
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    // 5. Build the application
    let app = create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper_handle.abort();
    tracing::info!("server shut down gracefully");
}
