//! Training job construction and execution.
//!
//! A training registers its model entity at submission, before the job
//! ever runs. The model starts in the `created` state and is flipped to
//! `trained` or `failed` by the scheduler once the run settles.

use std::sync::Arc;

use serde_json::Value;

use scriptorium_core::{CollectionId, Credentials, ModelId, ProjectId};

use crate::error::ScheduleError;
use crate::job::{Job, JobKind, JobState, JobTarget, Processing};
use crate::provider::{RunOutcome, TrainingContext, TrainingServiceProvider, WorkspacePaths};
use crate::store::{ModelStore, WorkspaceDirectory};
use crate::task::{check_target, ExecEnv};

/// Work payload of a model training.
pub struct TrainingWork {
    pub provider: Arc<dyn TrainingServiceProvider>,
    pub args: Value,
    pub dataset: Vec<CollectionId>,
    /// Entity registered at submission time.
    pub model: ModelId,
}

/// Submission parameters for a training.
pub struct TrainingRequest {
    pub project: ProjectId,
    pub provider: Arc<dyn TrainingServiceProvider>,
    pub args: Value,
    /// Ground-truth collections the trainer reads.
    pub dataset: Vec<CollectionId>,
    pub model_name: String,
    pub model_description: Option<String>,
    pub keywords: Vec<String>,
    pub processing: Processing,
    pub description: String,
}

impl Job {
    /// Build a training job. The model entity is created here so it is
    /// visible while the training is still queued; every check runs
    /// before the write so a rejected submission registers nothing.
    pub fn training(
        request: TrainingRequest,
        credentials: &Credentials,
        directory: &dyn WorkspaceDirectory,
        models: &dyn ModelStore,
    ) -> Result<Job, ScheduleError> {
        if !credentials.rights.execute {
            return Err(ScheduleError::Authorization(
                "execute right required".to_string(),
            ));
        }
        let model_name = request.model_name.trim();
        if model_name.is_empty() {
            return Err(ScheduleError::Validation(
                "model name must not be blank".to_string(),
            ));
        }
        if request.dataset.is_empty() {
            return Err(ScheduleError::Validation(
                "training dataset must not be empty".to_string(),
            ));
        }
        for collection in &request.dataset {
            if !directory.collection_exists(collection) {
                return Err(ScheduleError::Validation(format!(
                    "unknown collection: {collection}"
                )));
            }
            if !directory.collection_readable(collection, credentials.user.as_ref()) {
                return Err(ScheduleError::Authorization(format!(
                    "collection {collection} is not readable"
                )));
            }
        }
        request
            .provider
            .model()
            .validate(&request.args)
            .map_err(ScheduleError::Validation)?;

        let target = JobTarget::project(request.project);
        check_target(directory, &target, credentials.rights)?;

        let entity = models
            .create(
                model_name,
                request.model_description.as_deref(),
                &request.keywords,
                credentials.user.as_ref(),
            )
            .map_err(|e| ScheduleError::Internal(format!("model registration failed: {e}")))?;

        Ok(Job::new(
            credentials.user.clone(),
            credentials.rights,
            request.description,
            request.processing,
            target,
            JobKind::Training(TrainingWork {
                provider: request.provider,
                args: request.args,
                dataset: request.dataset,
                model: entity.id,
            }),
        ))
    }
}

/// Run a training to a terminal state. Model state bookkeeping happens
/// in the scheduler after the run settles.
pub(crate) fn execute(job: &Job, work: &TrainingWork, env: ExecEnv<'_>) -> (JobState, String) {
    if let Err(e) = check_target(env.directory, job.target(), job.rights()) {
        return (JobState::Interrupted, e.to_string());
    }

    let token = job.cancel_token();
    let mut trainer = work.provider.trainer();
    let ctx = TrainingContext {
        project: &job.target().project,
        args: &work.args,
        dataset: &work.dataset,
        model: work.model,
        paths: WorkspacePaths::for_training(env.data_dir, &job.target().project, work.model),
        cancel: &token,
        monitor: env.monitor,
    };
    match trainer.run(ctx) {
        RunOutcome::Completed => (JobState::Completed, "training finished".to_string()),
        RunOutcome::Interrupted { reason } => (JobState::Interrupted, reason),
        RunOutcome::Canceled => (JobState::Canceled, "canceled on request".to_string()),
    }
}
