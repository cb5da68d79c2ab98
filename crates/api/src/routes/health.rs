//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::{health, metrics, MetricsSnapshot};
use tracing::{debug, warn};

use crate::response::{HealthResponse, ProbeResponse};
use crate::state::AppState;

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = health();
    let report = registry.report();
    debug!(status = report.status.as_str(), "Health check");

    Json(HealthResponse {
        status: report.status.as_str().to_string(),
        queue_connected: registry.queue.is_healthy(),
        store_connected: registry.store.is_healthy(),
        topic_connected: registry.topic.is_healthy(),
        messages_in_flight: metrics().messages_in_flight.get(),
        feed_checkpoint: metrics().feed_checkpoint.get(),
        uptime_secs: state.uptime_secs(),
        pipeline: state.pipeline.as_ref().clone(),
        components: report.components,
    })
}

/// GET /health/ready - Readiness probe (queue, store and topic reachable).
pub async fn ready_handler() -> (StatusCode, Json<ProbeResponse>) {
    let registry = health();
    let ready = registry.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        warn!(
            queue = registry.queue.is_healthy(),
            store = registry.store.is_healthy(),
            topic = registry.topic.is_healthy(),
            "Readiness check failed"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ProbeResponse::new(ready)))
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> (StatusCode, Json<ProbeResponse>) {
    let alive = health().is_alive();
    let status = if alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ProbeResponse::new(alive)))
}

/// GET /metrics - Point-in-time pipeline counters.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
