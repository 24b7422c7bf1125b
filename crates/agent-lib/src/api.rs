//! HTTP API: recent anomalies, health checks and Prometheus metrics
//!
//! The API only reads from the anomaly store; it shares nothing with the
//! detection loop except the store and the health registry.

use crate::health::{ComponentStatus, HealthRegistry};
use crate::observability::DetectorMetrics;
use crate::store::AnomalyStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Number of anomalies returned by the listing endpoint
pub const RECENT_ANOMALY_LIMIT: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnomalyStore>,
    pub health_registry: HealthRegistry,
    pub metrics: DetectorMetrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AnomalyStore>,
        health_registry: HealthRegistry,
        metrics: DetectorMetrics,
    ) -> Self {
        Self {
            store,
            health_registry,
            metrics,
        }
    }
}

/// Most recent anomalies, newest first
async fn list_anomalies(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_recent(RECENT_ANOMALY_LIMIT).await {
        Ok(anomalies) => (StatusCode::OK, Json(anomalies)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list anomalies");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/anomalies", get(list_anomalies))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server; returns once `shutdown` is cancelled and in-flight
/// requests have finished
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
