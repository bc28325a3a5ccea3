//! Job submission, observation, and cancellation endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;
use utoipa::ToSchema;

use scriptorium_core::JobId;
use scriptorium_scheduler::{
    Job, JobFilter, JobState, JobView, Processing, ProjectTaskRequest, SandboxTaskRequest,
    ScheduleError, TrainingRequest,
};

use crate::error::{not_found, ApiError};
use crate::state::AppState;

use super::credentials;

fn default_processing() -> Processing {
    Processing::Serial
}

/// Body of `POST /tasks`. Presence of `sandbox` selects the
/// sandbox-scoped shape, in which case `parent` and `label` are
/// required as well.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct TaskSubmission {
    pub project: String,
    #[serde(default)]
    pub sandbox: Option<String>,
    /// Track of the snapshot the new snapshot derives from.
    #[serde(default)]
    pub parent: Option<Vec<u32>>,
    /// Label of the snapshot materialized when the job runs.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub snapshot_description: Option<String>,
    pub provider: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub args: Value,
    #[serde(default = "default_processing")]
    pub processing: Processing,
    #[serde(default)]
    pub description: String,
}

/// Body of `POST /trainings`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct TrainingSubmission {
    pub project: String,
    pub provider: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub args: Value,
    /// Ground-truth collections the model is trained on.
    pub dataset: Vec<String>,
    pub model_name: String,
    #[serde(default)]
    pub model_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_processing")]
    pub processing: Processing,
    #[serde(default)]
    pub description: String,
}

/// Returned by both submission endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SubmissionResponse {
    pub job_id: JobId,
    pub status: JobState,
}

/// Submit a task for execution.
///
/// Project-scoped when `sandbox` is absent. Sandbox-scoped otherwise:
/// the snapshot named by `label` is materialized under `parent` when a
/// worker picks the job up, so a rejected submission leaves no trace.
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Jobs",
    request_body = TaskSubmission,
    responses(
        (status = 200, description = "Job admitted", body = SubmissionResponse),
        (status = 400, description = "Malformed submission", body = Object),
        (status = 403, description = "Missing right", body = Object),
        (status = 409, description = "Target not accepting work", body = Object),
        (status = 503, description = "Scheduler saturated", body = Object)
    )
)]
pub(crate) async fn submit_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TaskSubmission>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let creds = credentials(&headers);
    let provider = state.registry.process(&body.provider).ok_or_else(|| {
        ScheduleError::Validation(format!("unknown provider '{}'", body.provider))
    })?;

    let job = match body.sandbox {
        Some(sandbox) => {
            let parent = body.parent.ok_or_else(|| {
                ScheduleError::Validation("sandbox tasks require a parent snapshot".to_string())
            })?;
            let label = body.label.ok_or_else(|| {
                ScheduleError::Validation("sandbox tasks require a snapshot label".to_string())
            })?;
            Job::sandbox_task(
                SandboxTaskRequest {
                    project: body.project,
                    sandbox,
                    parent,
                    label,
                    snapshot_description: body.snapshot_description,
                    provider,
                    args: body.args,
                    processing: body.processing,
                    description: body.description,
                },
                &creds,
                state.directory.as_ref(),
                state.snapshots.as_ref(),
            )?
        }
        None => Job::project_task(
            ProjectTaskRequest {
                project: body.project,
                provider,
                args: body.args,
                processing: body.processing,
                description: body.description,
            },
            &creds,
            state.directory.as_ref(),
        )?,
    };

    let id = job.id();
    let status = state.scheduler.schedule(job)?;
    Ok(Json(SubmissionResponse { job_id: id, status }))
}

/// Submit a training run.
///
/// The model entity is registered before the job is admitted; if
/// admission itself fails the model is marked failed so no orphaned
/// `created` entry lingers.
#[utoipa::path(
    post,
    path = "/trainings",
    tag = "Jobs",
    request_body = TrainingSubmission,
    responses(
        (status = 200, description = "Training admitted", body = SubmissionResponse),
        (status = 400, description = "Malformed submission", body = Object),
        (status = 403, description = "Missing right", body = Object),
        (status = 409, description = "Target not accepting work", body = Object),
        (status = 503, description = "Scheduler saturated", body = Object)
    )
)]
pub(crate) async fn submit_training(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TrainingSubmission>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let creds = credentials(&headers);
    let provider = state.registry.training(&body.provider).ok_or_else(|| {
        ScheduleError::Validation(format!("unknown provider '{}'", body.provider))
    })?;

    let job = Job::training(
        TrainingRequest {
            project: body.project,
            provider,
            args: body.args,
            dataset: body.dataset,
            model_name: body.model_name,
            model_description: body.model_description,
            keywords: body.keywords,
            processing: body.processing,
            description: body.description,
        },
        &creds,
        state.directory.as_ref(),
        state.models.as_ref(),
    )?;

    let id = job.id();
    let model = job.model_id();
    match state.scheduler.schedule(job) {
        Ok(status) => Ok(Json(SubmissionResponse { job_id: id, status })),
        Err(e) => {
            if let Some(model) = model {
                if let Err(store_err) = state.models.mark_failed(model, "job was never admitted") {
                    error!(model = %model, "failed to settle rejected training model: {}", store_err);
                }
            }
            Err(e.into())
        }
    }
}

/// List retained jobs, optionally filtered.
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    params(JobFilter),
    responses(
        (status = 200, description = "Jobs matching the filter, oldest first", body = Vec<JobView>)
    )
)]
pub(crate) async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<JobFilter>,
) -> Json<Vec<JobView>> {
    Json(state.scheduler.jobs(&filter))
}

/// Fetch one job by id.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = JobId, Path, description = "Job id")),
    responses(
        (status = 200, description = "Current job view", body = JobView),
        (status = 404, description = "Unknown or evicted job", body = Object)
    )
)]
pub(crate) async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Response {
    match state.scheduler.job(id) {
        Some(view) => Json(view).into_response(),
        None => not_found("job"),
    }
}

/// Request cancellation of a job.
///
/// Scheduled jobs are canceled immediately; running jobs observe the
/// raised token at their next checkpoint. The final state is visible
/// via `GET /jobs/{id}`.
#[utoipa::path(
    post,
    path = "/jobs/{id}/cancel",
    tag = "Jobs",
    params(("id" = JobId, Path, description = "Job id")),
    responses(
        (status = 200, description = "Cancellation requested", body = Object),
        (status = 404, description = "Unknown or evicted job", body = Object)
    )
)]
pub(crate) async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Response {
    if state.scheduler.cancel(id) {
        Json(json!({"job-id": id, "status": "cancellation-requested"})).into_response()
    } else {
        not_found("job")
    }
}
