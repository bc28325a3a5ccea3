//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/scheduler/metrics", get(api::health::scheduler_metrics))
        .route("/providers", get(api::providers::list_providers))
        .route("/tasks", post(api::jobs::submit_task))
        .route("/trainings", post(api::jobs::submit_training))
        .route("/jobs", get(api::jobs::list_jobs))
        .route("/jobs/{id}", get(api::jobs::get_job))
        .route("/jobs/{id}/cancel", post(api::jobs::cancel_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}
