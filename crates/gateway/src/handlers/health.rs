//! Health check handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

/// Service banner
///
/// GET /api/
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "CORTEXIFY API is running!"
    }))
}

/// Liveness probe
///
/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "cortexify-gateway",
        "version": cortexify_common::VERSION,
    }))
}

/// Readiness probe, verifies database connectivity
///
/// GET /api/ready
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "connected",
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "database": "disconnected",
                })),
            )
        }
    }
}
