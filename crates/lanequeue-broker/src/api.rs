use crate::Broker;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

/// Monitoring routes: Prometheus scrape endpoint and liveness probe
pub fn create_monitoring_api(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(broker)
}

async fn metrics_handler(State(broker): State<Arc<Broker>>) -> Result<String, (StatusCode, String)> {
    let metric_families = broker.metrics().registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: i64,
}

async fn health_check(State(broker): State<Arc<Broker>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        sessions: broker.metrics().sessions_connected.get(),
    })
}
