//! Health and Prometheus metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::envelope::{Reply, ok};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// `GET /health`: system health and the active store backend.
pub async fn health<S: Store + Clone>(State(state): State<Arc<AppState<S>>>) -> Reply<HealthResponse> {
    ok(
        "Service is healthy",
        HealthResponse {
            status: "ok",
            store: state.backend,
        },
    )
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
