//! Health check endpoint for container orchestration.
//!
//! Provides a liveness probe that returns 200 OK when the process is running.
//! It touches no external dependency, so it reports process liveness only.

use axum::Json;
use serde::Serialize;

/// Body of `GET /health`, serialized as `{"status":"ok"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

impl HealthStatus {
    pub const OK: HealthStatus = HealthStatus { status: "ok" };
}

/// Health check handler.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::OK)
}
