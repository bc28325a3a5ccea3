//! Readiness and operational metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// False once shutdown has been requested.
    pub accepting: bool,
    pub retained_jobs: usize,
    pub providers: usize,
}

/// Service readiness plus a coarse picture of scheduler load.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: "0.1.0",
        accepting: !state.scheduler.is_shutdown(),
        retained_jobs: state.scheduler.retained_jobs(),
        providers: state.registry.descriptors().len(),
    })
}

/// Scheduler metrics: live gauges, terminal counts by state, and
/// per-provider execution stats.
#[utoipa::path(
    get,
    path = "/scheduler/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Current scheduler metrics", body = Object)
    )
)]
pub(crate) async fn scheduler_metrics(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let metrics = state.scheduler.metrics();
    Json(serde_json::to_value(&metrics).unwrap_or(serde_json::Value::Null))
}
