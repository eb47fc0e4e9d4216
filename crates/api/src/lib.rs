//! HTTP API server with observability for the order-fulfillment engine.
//!
//! Exposes checkout, payment, inventory, and discount endpoints over the
//! fulfillment layer, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use fulfillment::{
    FulfillmentService, InMemoryAuditSink, InMemoryGateway, InMemoryNotificationSender,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{AvailabilityCache, DiscountStore, InMemoryStore, InventoryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub service: Arc<FulfillmentService>,
    pub inventory: Arc<dyn InventoryStore>,
    pub discounts: Arc<dyn DiscountStore>,
    pub availability_cache: AvailabilityCache,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/ship", post(routes::orders::ship))
        .route("/orders/{id}/deliver", post(routes::orders::deliver))
        .route("/orders/{id}/return", post(routes::orders::return_order))
        .route("/orders/{id}/payment", post(routes::payments::initiate))
        .route("/payments/callback", post(routes::payments::callback))
        .route("/payments/{id}/refund", post(routes::payments::refund))
        .route("/inventory/{variant_id}", get(routes::inventory::get))
        .route("/inventory/{variant_id}", put(routes::inventory::put_level))
        .route(
            "/inventory/{variant_id}/adjust",
            post(routes::inventory::adjust),
        )
        .route("/discounts", post(routes::discounts::create))
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

/// Creates application state over the in-memory store, for development and
/// tests. Returns the store and gateway fakes alongside the state so tests
/// can seed data and steer gateway behavior.
pub fn create_in_memory_state(config: &Config) -> (Arc<AppState>, InMemoryStore, InMemoryGateway) {
    let store = InMemoryStore::new();
    let gateway = InMemoryGateway::new();

    let service = Arc::new(FulfillmentService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        Arc::new(InMemoryNotificationSender::new()),
        Arc::new(InMemoryAuditSink::new()),
        config.fulfillment(),
    ));

    let state = Arc::new(AppState {
        service,
        inventory: Arc::new(store.clone()),
        discounts: Arc::new(store.clone()),
        availability_cache: AvailabilityCache::new(Duration::from_secs(
            config.availability_cache_ttl_secs,
        )),
    });

    (state, store, gateway)
}
