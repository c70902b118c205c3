//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;

/// Health check endpoint
///
/// Pings the database when one is attached; a failed ping reports 503.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let Some(database) = state.database.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "ika"
            })),
        );
    };

    match database.health_check().await {
        Ok(latency) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "ika",
                "database": { "latency_ms": latency.as_millis() as u64 }
            })),
        ),
        Err(e) => {
            warn!("Database health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "ika",
                    "database": { "error": e.to_string() }
                })),
            )
        }
    }
}
