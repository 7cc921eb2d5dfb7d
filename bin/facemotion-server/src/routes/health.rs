//! Health / heartbeat endpoint and the root service-info page.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::schemas::HealthResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health, service_info), components(schemas(HealthResponse)))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Load-balancers and monitoring systems should poll this endpoint.
/// `gpu_available: false` is informational, not a failure: the service still
/// accepts work and runs the engine on CPU.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        timestamp: Utc::now(),
        gpu_available: state.manager.accelerator_available(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

/// Service info at the root path.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service description", body = Value)
    )
)]
pub async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "facemotion",
        "description": "Talking-head video synthesis orchestration service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "generate": "POST /api/v1/generate",
            "status":   "GET /api/v1/status/{task_id}",
            "download": "GET /api/v1/download/{task_id}",
            "cancel":   "POST /api/v1/tasks/{task_id}/cancel",
            "delete":   "DELETE /api/v1/tasks/{task_id}",
            "health":   "GET /api/v1/health",
        },
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn service_info_lists_the_endpoints() {
        let Json(body) = service_info().await;
        assert_eq!(body["service"], "facemotion");
        assert!(body["endpoints"]["generate"].as_str().unwrap_or("").contains("/api/v1/generate"));
    }
}
