//! Health check endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

/// `GET /api/health` — unauthenticated liveness probe.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Klinik API is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: crate::config::APP_VERSION,
    })
}
