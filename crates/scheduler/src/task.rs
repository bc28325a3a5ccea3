//! Project- and sandbox-scoped task construction and execution.
//!
//! Construction validates a submission against the directory and the
//! snapshot store and fails without side effects. Execution re-checks
//! target availability, materializes the snapshot for sandbox work,
//! and drives the provider's processor to an outcome.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use scriptorium_core::{Credentials, ProjectId, Rights, SandboxId, SnapshotTrack};

use crate::error::ScheduleError;
use crate::job::{Job, JobKind, JobState, JobTarget, Processing};
use crate::provider::{
    CoreData, JobMonitor, ProcessContext, ProcessServiceProvider, RunOutcome, WorkspacePaths,
};
use crate::store::{
    track_label, NewSnapshot, ProjectState, SandboxState, Snapshot, SnapshotStore,
    WorkspaceDirectory,
};

/// Work payload of a project-scoped task.
pub struct ProjectWork {
    pub provider: Arc<dyn ProcessServiceProvider>,
    pub args: Value,
}

/// Work payload of a sandbox-scoped task. The snapshot is materialized
/// when the job runs, not at submission.
pub struct SandboxWork {
    pub provider: Arc<dyn ProcessServiceProvider>,
    pub args: Value,
    pub snapshot: NewSnapshot,
}

/// Submission parameters for a project-scoped task.
pub struct ProjectTaskRequest {
    pub project: ProjectId,
    pub provider: Arc<dyn ProcessServiceProvider>,
    pub args: Value,
    pub processing: Processing,
    pub description: String,
}

/// Submission parameters for a sandbox-scoped task.
pub struct SandboxTaskRequest {
    pub project: ProjectId,
    pub sandbox: SandboxId,
    /// Parent snapshot the new snapshot derives from.
    pub parent: SnapshotTrack,
    /// Label of the snapshot to materialize.
    pub label: String,
    pub snapshot_description: Option<String>,
    pub provider: Arc<dyn ProcessServiceProvider>,
    pub args: Value,
    pub processing: Processing,
    pub description: String,
}

impl Job {
    /// Build a task operating on project-level data.
    pub fn project_task(
        request: ProjectTaskRequest,
        credentials: &Credentials,
        directory: &dyn WorkspaceDirectory,
    ) -> Result<Job, ScheduleError> {
        ensure_execute_right(credentials)?;
        ensure_scope(request.provider.as_ref(), CoreData::Project)?;
        request
            .provider
            .model()
            .validate(&request.args)
            .map_err(ScheduleError::Validation)?;

        let target = JobTarget::project(request.project);
        check_target(directory, &target, credentials.rights)?;

        Ok(Job::new(
            credentials.user.clone(),
            credentials.rights,
            request.description,
            request.processing,
            target,
            JobKind::Project(ProjectWork {
                provider: request.provider,
                args: request.args,
            }),
        ))
    }

    /// Build a task operating inside a sandbox. The snapshot label and
    /// parent are validated here; the snapshot itself is materialized
    /// when the job runs, so a rejected submission leaves no trace.
    pub fn sandbox_task(
        request: SandboxTaskRequest,
        credentials: &Credentials,
        directory: &dyn WorkspaceDirectory,
        snapshots: &dyn SnapshotStore,
    ) -> Result<Job, ScheduleError> {
        ensure_execute_right(credentials)?;
        ensure_scope(request.provider.as_ref(), CoreData::Sandbox)?;

        let label = request.label.trim();
        if label.is_empty() {
            return Err(ScheduleError::Validation(
                "snapshot label must not be blank".to_string(),
            ));
        }
        request
            .provider
            .model()
            .validate(&request.args)
            .map_err(ScheduleError::Validation)?;

        let target = JobTarget::sandbox(
            request.project.clone(),
            request.sandbox.clone(),
            request.parent.clone(),
        );
        check_target(directory, &target, credentials.rights)?;

        snapshots
            .resolve(&request.project, &request.sandbox, &request.parent)
            .map_err(|e| {
                ScheduleError::Validation(format!(
                    "parent snapshot {} cannot be resolved: {e}",
                    track_label(&request.parent)
                ))
            })?;

        Ok(Job::new(
            credentials.user.clone(),
            credentials.rights,
            request.description,
            request.processing,
            target,
            JobKind::Sandbox(SandboxWork {
                snapshot: NewSnapshot {
                    parent: request.parent,
                    kind: request.provider.snapshot_kind(),
                    label: label.to_string(),
                    description: request.snapshot_description,
                },
                provider: request.provider,
                args: request.args,
            }),
        ))
    }
}

fn ensure_execute_right(credentials: &Credentials) -> Result<(), ScheduleError> {
    if credentials.rights.execute {
        Ok(())
    } else {
        Err(ScheduleError::Authorization(
            "execute right required".to_string(),
        ))
    }
}

fn ensure_scope(
    provider: &dyn ProcessServiceProvider,
    expected: CoreData,
) -> Result<(), ScheduleError> {
    if provider.core_data() == expected {
        Ok(())
    } else {
        Err(ScheduleError::Validation(format!(
            "provider '{}' does not operate on {:?} data",
            provider.id(),
            expected
        )))
    }
}

/// Check that the target accepts work right now. Used at submission and
/// again on the worker, since the world may change in between.
pub(crate) fn check_target(
    directory: &dyn WorkspaceDirectory,
    target: &JobTarget,
    rights: Rights,
) -> Result<(), ScheduleError> {
    match directory.project_state(&target.project) {
        None => {
            return Err(ScheduleError::Validation(format!(
                "unknown project: {}",
                target.project
            )))
        }
        Some(ProjectState::Closed) => {
            return Err(ScheduleError::Unavailable(format!(
                "project {} is closed",
                target.project
            )))
        }
        Some(ProjectState::Active) => {}
    }
    if let Some(sandbox) = &target.sandbox {
        match directory.sandbox_state(&target.project, sandbox) {
            None => {
                return Err(ScheduleError::Validation(format!(
                    "unknown sandbox: {}/{sandbox}",
                    target.project
                )))
            }
            Some(SandboxState::Secured) if !rights.special => {
                return Err(ScheduleError::Authorization(format!(
                    "sandbox {sandbox} is secured"
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Execution collaborators handed down from the scheduler.
pub(crate) struct ExecEnv<'a> {
    pub directory: &'a dyn WorkspaceDirectory,
    pub snapshots: &'a dyn SnapshotStore,
    pub data_dir: &'a Path,
    pub monitor: &'a dyn JobMonitor,
}

/// Run a project-scoped task to a terminal state.
pub(crate) fn execute_project(job: &Job, work: &ProjectWork, env: ExecEnv<'_>) -> (JobState, String) {
    if let Err(e) = check_target(env.directory, job.target(), job.rights()) {
        return (JobState::Interrupted, e.to_string());
    }
    run_processor(job, work.provider.as_ref(), &work.args, None, &env)
}

/// Run a sandbox-scoped task: availability re-check, snapshot
/// materialization, then the processor.
pub(crate) fn execute_sandbox(job: &Job, work: &SandboxWork, env: ExecEnv<'_>) -> (JobState, String) {
    if let Err(e) = check_target(env.directory, job.target(), job.rights()) {
        return (JobState::Interrupted, e.to_string());
    }
    let Some(sandbox) = job.target().sandbox.as_ref() else {
        return (
            JobState::Interrupted,
            "job has no sandbox target".to_string(),
        );
    };

    let snapshot = match env
        .snapshots
        .create(&job.target().project, sandbox, &work.snapshot, job.owner())
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return (
                JobState::Interrupted,
                format!("snapshot creation failed: {e}"),
            )
        }
    };
    job.set_snapshot(snapshot.track.clone());
    env.monitor.log(&format!(
        "materialized snapshot {} ({})",
        track_label(&snapshot.track),
        snapshot.label
    ));

    run_processor(job, work.provider.as_ref(), &work.args, Some(&snapshot), &env)
}

fn run_processor(
    job: &Job,
    provider: &dyn ProcessServiceProvider,
    args: &Value,
    snapshot: Option<&Snapshot>,
    env: &ExecEnv<'_>,
) -> (JobState, String) {
    let token = job.cancel_token();
    let mut processor = provider.processor();
    let ctx = ProcessContext {
        target: job.target(),
        args,
        paths: WorkspacePaths::for_target(env.data_dir, job.target()),
        snapshot,
        cancel: &token,
        monitor: env.monitor,
    };
    match processor.run(ctx) {
        RunOutcome::Completed => (JobState::Completed, "processor finished".to_string()),
        RunOutcome::Interrupted { reason } => (JobState::Interrupted, reason),
        RunOutcome::Canceled => (JobState::Canceled, "canceled on request".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ArgKind, Processor, ProviderModel};
    use crate::store::memory::MemoryWorkspace;
    use serde_json::json;

    struct StubProvider {
        scope: CoreData,
    }

    impl ProcessServiceProvider for StubProvider {
        fn id(&self) -> &str {
            "ocr.stub"
        }
        fn name(&self) -> &str {
            "Stub"
        }
        fn core_data(&self) -> CoreData {
            self.scope
        }
        fn model(&self) -> ProviderModel {
            ProviderModel::new().arg("language", ArgKind::Text, true)
        }
        fn processor(&self) -> Box<dyn Processor> {
            struct Noop;
            impl Processor for Noop {
                fn run(&mut self, _ctx: ProcessContext<'_>) -> RunOutcome {
                    RunOutcome::Completed
                }
            }
            Box::new(Noop)
        }
    }

    fn workspace() -> MemoryWorkspace {
        let ws = MemoryWorkspace::new();
        ws.add_project("book", ProjectState::Active);
        ws.add_project("archive", ProjectState::Closed);
        ws.add_sandbox("book", "run-1", SandboxState::Active);
        ws.add_sandbox("book", "frozen", SandboxState::Secured);
        ws
    }

    fn sandbox_request(label: &str) -> SandboxTaskRequest {
        SandboxTaskRequest {
            project: "book".to_string(),
            sandbox: "run-1".to_string(),
            parent: vec![1],
            label: label.to_string(),
            snapshot_description: None,
            provider: Arc::new(StubProvider {
                scope: CoreData::Sandbox,
            }),
            args: json!({"language": "lat"}),
            processing: Processing::Serial,
            description: "recognize text".to_string(),
        }
    }

    #[test]
    fn sandbox_task_accepts_valid_submission() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let job = Job::sandbox_task(sandbox_request("Run OCR"), &creds, &ws, &ws).unwrap();

        assert_eq!(job.state(), JobState::Scheduled);
        assert_eq!(job.target().project, "book");
        assert_eq!(job.target().sandbox.as_deref(), Some("run-1"));
        assert_eq!(job.target().track.as_deref(), Some(&[1][..]));
        assert_eq!(job.owner().map(String::as_str), Some("alice"));
    }

    #[test]
    fn blank_label_is_rejected_without_side_effects() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let err = Job::sandbox_task(sandbox_request("   "), &creds, &ws, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));

        // No snapshot was created during validation.
        let root_children = ws
            .resolve(&"book".to_string(), &"run-1".to_string(), &vec![1, 1])
            .is_err();
        assert!(root_children);
    }

    #[test]
    fn missing_execute_right_is_authorization() {
        let ws = workspace();
        let creds = Credentials::for_user("bob", Rights::default());
        let err = Job::sandbox_task(sandbox_request("Run OCR"), &creds, &ws, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Authorization(_)));
    }

    #[test]
    fn secured_sandbox_needs_special_right() {
        let ws = workspace();
        let mut request = sandbox_request("Run OCR");
        request.sandbox = "frozen".to_string();
        let plain = Credentials::for_user("bob", Rights::operator());
        let err = Job::sandbox_task(request, &plain, &ws, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Authorization(_)));

        let mut request = sandbox_request("Run OCR");
        request.sandbox = "frozen".to_string();
        let elevated = Credentials::for_user("root", Rights::full());
        assert!(Job::sandbox_task(request, &elevated, &ws, &ws).is_ok());
    }

    #[test]
    fn closed_project_is_unavailable() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let request = ProjectTaskRequest {
            project: "archive".to_string(),
            provider: Arc::new(StubProvider {
                scope: CoreData::Project,
            }),
            args: json!({"language": "lat"}),
            processing: Processing::Parallel,
            description: "export".to_string(),
        };
        let err = Job::project_task(request, &creds, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Unavailable(_)));
    }

    #[test]
    fn unknown_parent_track_is_validation() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let mut request = sandbox_request("Run OCR");
        request.parent = vec![1, 9];
        let err = Job::sandbox_task(request, &creds, &ws, &ws).unwrap_err();
        match err {
            ScheduleError::Validation(msg) => assert!(msg.contains("1.9"), "got: {msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn scope_mismatch_is_validation() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let mut request = sandbox_request("Run OCR");
        request.provider = Arc::new(StubProvider {
            scope: CoreData::Project,
        });
        let err = Job::sandbox_task(request, &creds, &ws, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
    }

    #[test]
    fn bad_args_are_validation() {
        let ws = workspace();
        let creds = Credentials::for_user("alice", Rights::operator());
        let mut request = sandbox_request("Run OCR");
        request.args = json!({"language": 12});
        let err = Job::sandbox_task(request, &creds, &ws, &ws).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
    }
}
