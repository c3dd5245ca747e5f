use axum::Json;
use serde::Serialize;

use crate::utils::rfc3339_now;

/// Liveness response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Health check handler
///
/// Returns `{"status": "ok", "timestamp": <ISO-8601>}` while the process is
/// able to serve requests. It does not probe the completion provider.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: rfc3339_now(),
    })
}
