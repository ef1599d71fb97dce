//! Health probes for orchestration systems.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{error, instrument};

use crate::state::AppState;

/// Health endpoint with a database connectivity check.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": Utc::now(),
                "checks": {"database": "up"},
            })),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "timestamp": Utc::now(),
                    "checks": {"database": "down"},
                })),
            )
        },
    }
}

/// Liveness probe; answers without touching dependencies.
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "alive"})))
}
