//! HTTP API for the order fulfillment and ledger core.
//!
//! Every endpoint answers with the `{success, message, data}` envelope,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod envelope;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{FeeSchedule, FulfillmentService, NotificationSink};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store + Clone> {
    pub service: FulfillmentService<S>,
    /// Name of the store backend, reported by `/health`.
    pub backend: &'static str,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S>))
        .route("/orders/{id}/assign", post(routes::orders::assign::<S>))
        .route("/orders/{id}/reassign", post(routes::orders::reassign::<S>))
        .route("/drivers", post(routes::drivers::register::<S>))
        .route("/drivers/{id}", get(routes::drivers::get::<S>))
        .route("/wallets/{id}", get(routes::wallets::get::<S>))
        .route(
            "/wallets/{id}/transactions",
            get(routes::wallets::transactions::<S>),
        )
        .route("/wallets/{id}/reconcile", get(routes::wallets::reconcile::<S>))
        .route("/payouts", post(routes::payouts::request::<S>))
        .route("/payouts/{reference}", get(routes::payouts::get::<S>))
        .route(
            "/payouts/{reference}/complete",
            post(routes::payouts::complete::<S>),
        )
        .route("/payouts/{reference}/fail", post(routes::payouts::fail::<S>))
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

/// Creates the application state over a store.
pub fn create_state<S: Store + Clone>(
    store: S,
    backend: &'static str,
    fees: FeeSchedule,
    sink: Arc<dyn NotificationSink>,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        service: FulfillmentService::new(store, fees, sink),
        backend,
    })
}
