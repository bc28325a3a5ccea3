//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "scriptorium API",
        version = "0.1.0",
        description = "Job scheduling and execution for document-processing workflows.",
    ),
    tags(
        (name = "Jobs", description = "Task and training submission, status polling, and cancellation"),
        (name = "Providers", description = "Registered processing and training providers"),
        (name = "Health", description = "Server readiness and scheduler metrics"),
    ),
    paths(
        crate::api::jobs::submit_task,
        crate::api::jobs::submit_training,
        crate::api::jobs::list_jobs,
        crate::api::jobs::get_job,
        crate::api::jobs::cancel_job,
        crate::api::providers::list_providers,
        crate::api::health::health,
        crate::api::health::scheduler_metrics,
    )
)]
pub struct ApiDoc;
