//! Liveness route.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use mr_pipeline::PipelineHealth;

use crate::context::AppContext;

const SERVICE_NAME: &str = "mediarelay";

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` when every dependency is usable, otherwise `degraded`.
    pub status: String,
    pub service: String,
    pub version: String,
    pub instance_id: String,
    pub pid: u32,
    /// RFC 3339 timestamp of this response.
    pub timestamp: String,
    pub uptime_secs: i64,
    /// Runs that could start now without waiting for admission.
    pub available_slots: usize,
    pub dependencies: PipelineHealth,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process identity and dependency readiness", body = HealthResponse)
    )
)]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let dependencies = ctx.coordinator.health();
    let now = Utc::now();

    Json(HealthResponse {
        status: if dependencies.ready() { "ok" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: ctx.instance_id.to_string(),
        pid: std::process::id(),
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - ctx.started_at).num_seconds(),
        available_slots: ctx.coordinator.available_permits(),
        dependencies,
    })
}
