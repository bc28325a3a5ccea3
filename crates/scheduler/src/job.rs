use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use scriptorium_core::{JobId, ModelId, ProjectId, Rights, SandboxId, SnapshotTrack, UserId};

use crate::provider::CancelToken;
use crate::task::{ProjectWork, SandboxWork};
use crate::training::TrainingWork;

/// Lifecycle state of a job.
///
/// States only move forward: `scheduled` to `running` to one of the
/// terminal states, or `scheduled` straight to `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Admitted, waiting for a worker or a serial slot.
    Scheduled,
    /// A worker is executing the job.
    Running,
    /// Processor finished normally.
    Completed,
    /// Processor gave up or the target became unavailable.
    Interrupted,
    /// Cancellation was requested and honored.
    Canceled,
    /// Execution failed in a way the scheduler could not classify.
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Interrupted | JobState::Canceled | JobState::Unknown
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Interrupted => "interrupted",
            JobState::Canceled => "canceled",
            JobState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// How a job interacts with other jobs on the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Processing {
    /// May overlap with any other job.
    Parallel,
    /// Holds the target's serial slot for the duration of the run.
    Serial,
}

/// Worker pool a job is dispatched to, derived from its work kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerCategory {
    Tasks,
    Workflows,
    Trainings,
}

impl fmt::Display for WorkerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerCategory::Tasks => "tasks",
            WorkerCategory::Workflows => "workflows",
            WorkerCategory::Trainings => "trainings",
        };
        f.write_str(s)
    }
}

/// What a job operates on. Once set, target fields never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobTarget {
    pub project: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxId>,
    /// Parent snapshot track for sandbox-scoped work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<SnapshotTrack>,
}

/// Key of the per-target serial slot table.
pub(crate) type TargetKey = (ProjectId, Option<SandboxId>);

impl JobTarget {
    pub fn project(project: impl Into<ProjectId>) -> Self {
        Self {
            project: project.into(),
            sandbox: None,
            track: None,
        }
    }

    pub fn sandbox(
        project: impl Into<ProjectId>,
        sandbox: impl Into<SandboxId>,
        parent: SnapshotTrack,
    ) -> Self {
        Self {
            project: project.into(),
            sandbox: Some(sandbox.into()),
            track: Some(parent),
        }
    }

    pub(crate) fn serial_key(&self) -> TargetKey {
        (self.project.clone(), self.sandbox.clone())
    }
}

/// Work payload, tagged by the scope the job operates on.
pub enum JobKind {
    /// Project-scoped processor run.
    Project(ProjectWork),
    /// Sandbox-scoped processor run that materializes a new snapshot.
    Sandbox(SandboxWork),
    /// Model training over ground-truth collections.
    Training(TrainingWork),
}

impl JobKind {
    /// Provider id, used as the metrics key.
    pub fn provider_id(&self) -> &str {
        match self {
            JobKind::Project(w) => w.provider.id(),
            JobKind::Sandbox(w) => w.provider.id(),
            JobKind::Training(w) => w.provider.id(),
        }
    }

    pub fn category(&self) -> WorkerCategory {
        match self {
            JobKind::Project(_) => WorkerCategory::Tasks,
            JobKind::Sandbox(_) => WorkerCategory::Workflows,
            JobKind::Training(_) => WorkerCategory::Trainings,
        }
    }
}

impl fmt::Debug for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobKind::Project(_) => "Project",
            JobKind::Sandbox(_) => "Sandbox",
            JobKind::Training(_) => "Training",
        };
        write!(f, "JobKind::{}({})", label, self.provider_id())
    }
}

/// Mutable part of a job, guarded by one lock so views are consistent.
#[derive(Debug)]
struct RunState {
    state: JobState,
    created: DateTime<Utc>,
    started: Option<DateTime<Utc>>,
    ended: Option<DateTime<Utc>>,
    progress: f64,
    reason: Option<String>,
    journal: Vec<String>,
    /// Track of the snapshot this job materialized, if any.
    snapshot: Option<SnapshotTrack>,
}

/// A unit of schedulable work plus its runtime record.
///
/// Jobs are built through [`Job::project_task`], [`Job::sandbox_task`]
/// or [`Job::training`], which validate the submission against the
/// stores. After construction only the scheduler mutates the record.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    owner: Option<UserId>,
    rights: Rights,
    description: String,
    processing: Processing,
    target: JobTarget,
    kind: JobKind,
    cancel: CancelToken,
    run: RwLock<RunState>,
}

impl Job {
    pub(crate) fn new(
        owner: Option<UserId>,
        rights: Rights,
        description: String,
        processing: Processing,
        target: JobTarget,
        kind: JobKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            rights,
            description,
            processing,
            target,
            kind,
            cancel: CancelToken::new(),
            run: RwLock::new(RunState {
                state: JobState::Scheduled,
                created: Utc::now(),
                started: None,
                ended: None,
                progress: 0.0,
                reason: None,
                journal: Vec::new(),
                snapshot: None,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    pub(crate) fn rights(&self) -> Rights {
        self.rights
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn processing(&self) -> Processing {
        self.processing
    }

    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    pub(crate) fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn category(&self) -> WorkerCategory {
        self.kind.category()
    }

    /// Model registered for this job at submission, if it is a training.
    pub fn model_id(&self) -> Option<ModelId> {
        match &self.kind {
            JobKind::Training(w) => Some(w.model),
            _ => None,
        }
    }

    pub fn state(&self) -> JobState {
        self.run.read().expect("job lock poisoned").state
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn created_at(&self) -> DateTime<Utc> {
        self.run.read().expect("job lock poisoned").created
    }

    pub(crate) fn started_at(&self) -> Option<DateTime<Utc>> {
        self.run.read().expect("job lock poisoned").started
    }

    pub(crate) fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.run.read().expect("job lock poisoned").ended
    }

    pub(crate) fn snapshot_track(&self) -> Option<SnapshotTrack> {
        self.run.read().expect("job lock poisoned").snapshot.clone()
    }

    /// Flip `scheduled` to `running`. Returns false when the job left
    /// `scheduled` in the meantime (e.g. canceled before pickup).
    pub(crate) fn mark_running(&self) -> bool {
        let mut run = self.run.write().expect("job lock poisoned");
        if run.state != JobState::Scheduled {
            return false;
        }
        run.state = JobState::Running;
        run.started = Some(Utc::now());
        true
    }

    /// Move to a terminal state, recording when and why. Returns false
    /// when the job already is terminal; the existing state wins then.
    pub(crate) fn finish(&self, state: JobState, reason: &str) -> bool {
        let mut run = self.run.write().expect("job lock poisoned");
        if run.state.is_terminal() {
            return false;
        }
        run.state = state;
        run.ended = Some(Utc::now());
        run.reason = Some(reason.to_string());
        if state == JobState::Completed {
            run.progress = 1.0;
        }
        true
    }

    /// Cancel while still `scheduled`. Returns false once the job has
    /// started (or finished); callers then fall back to the token.
    pub(crate) fn cancel_if_scheduled(&self, reason: &str) -> bool {
        let mut run = self.run.write().expect("job lock poisoned");
        if run.state != JobState::Scheduled {
            return false;
        }
        run.state = JobState::Canceled;
        run.ended = Some(Utc::now());
        run.reason = Some(reason.to_string());
        true
    }

    pub(crate) fn set_progress(&self, fraction: f64) {
        let mut run = self.run.write().expect("job lock poisoned");
        run.progress = fraction.clamp(0.0, 1.0);
    }

    pub(crate) fn append_journal(&self, line: &str, limit: usize) {
        let mut run = self.run.write().expect("job lock poisoned");
        if run.journal.len() >= limit {
            run.journal.remove(0);
        }
        run.journal.push(line.to_string());
    }

    pub(crate) fn set_snapshot(&self, track: SnapshotTrack) {
        let mut run = self.run.write().expect("job lock poisoned");
        run.snapshot = Some(track);
    }

    /// Point-in-time picture of the job, consistent across all fields.
    pub fn view(&self) -> JobView {
        let run = self.run.read().expect("job lock poisoned");
        JobView {
            id: self.id,
            state: run.state,
            category: self.kind.category(),
            processing: self.processing,
            description: self.description.clone(),
            owner: self.owner.clone(),
            target: self.target.clone(),
            progress: run.progress,
            reason: run.reason.clone(),
            snapshot: run.snapshot.clone(),
            journal: run.journal.clone(),
            created: run.created,
            started: run.started,
            ended: run.ended,
        }
    }
}

/// Serializable picture of a job at one instant.
///
/// `started` and `ended` stay explicit nulls until set so pollers can
/// tell "never started" from "missing field".
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobView {
    pub id: JobId,
    pub state: JobState,
    pub category: WorkerCategory,
    pub processing: Processing,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    pub target: JobTarget,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Track of the snapshot materialized by this job, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotTrack>,
    #[serde(default)]
    pub journal: Vec<String>,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

/// Filter for job listings. An empty filter matches everything.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct JobFilter {
    pub project: Option<ProjectId>,
    pub sandbox: Option<SandboxId>,
    pub state: Option<JobState>,
    pub owner: Option<UserId>,
}

impl JobFilter {
    pub(crate) fn matches(&self, job: &Job) -> bool {
        if let Some(project) = &self.project {
            if &job.target().project != project {
                return false;
            }
        }
        if let Some(sandbox) = &self.sandbox {
            if job.target().sandbox.as_ref() != Some(sandbox) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if job.state() != state {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if job.owner() != Some(owner) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_job(processing: Processing) -> Job {
        use crate::provider::tests::NullProvider;
        use std::sync::Arc;

        Job::new(
            Some("alice".to_string()),
            Rights::full(),
            "test job".to_string(),
            processing,
            JobTarget::project("demo"),
            JobKind::Project(ProjectWork {
                provider: Arc::new(NullProvider::default()),
                args: serde_json::json!({}),
            }),
        )
    }

    #[test]
    fn new_job_starts_scheduled() {
        let job = bare_job(Processing::Parallel);
        assert_eq!(job.state(), JobState::Scheduled);
        let view = job.view();
        assert_eq!(view.progress, 0.0);
        assert!(view.started.is_none());
        assert!(view.ended.is_none());
        assert!(view.reason.is_none());
    }

    #[test]
    fn states_only_move_forward() {
        let job = bare_job(Processing::Parallel);
        assert!(job.mark_running());
        assert!(job.started_at().is_some());
        // Already running; a second pickup must be refused.
        assert!(!job.mark_running());

        assert!(job.finish(JobState::Completed, "processor finished"));
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.view().progress, 1.0);

        // Terminal states are sticky.
        assert!(!job.finish(JobState::Interrupted, "too late"));
        assert!(!job.mark_running());
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.view().reason.as_deref(), Some("processor finished"));
    }

    #[test]
    fn cancel_if_scheduled_beats_pickup() {
        let job = bare_job(Processing::Serial);
        assert!(job.cancel_if_scheduled("canceled before start"));
        assert_eq!(job.state(), JobState::Canceled);
        // The worker that later picks the job up must see it gone.
        assert!(!job.mark_running());
        assert!(job.started_at().is_none());
        assert!(job.ended_at().is_some());
    }

    #[test]
    fn cancel_if_scheduled_refused_once_running() {
        let job = bare_job(Processing::Parallel);
        assert!(job.mark_running());
        assert!(!job.cancel_if_scheduled("too late"));
        assert_eq!(job.state(), JobState::Running);
    }

    #[test]
    fn journal_is_bounded() {
        let job = bare_job(Processing::Parallel);
        for i in 0..10 {
            job.append_journal(&format!("line {i}"), 4);
        }
        let journal = job.view().journal;
        assert_eq!(journal.len(), 4);
        assert_eq!(journal.first().map(String::as_str), Some("line 6"));
        assert_eq!(journal.last().map(String::as_str), Some("line 9"));
    }

    #[test]
    fn progress_is_clamped() {
        let job = bare_job(Processing::Parallel);
        job.set_progress(1.5);
        assert_eq!(job.view().progress, 1.0);
        job.set_progress(-0.5);
        assert_eq!(job.view().progress, 0.0);
    }

    #[test]
    fn filter_matches_project_and_state() {
        let job = bare_job(Processing::Parallel);
        let mut filter = JobFilter::default();
        assert!(filter.matches(&job));

        filter.project = Some("demo".to_string());
        filter.state = Some(JobState::Scheduled);
        filter.owner = Some("alice".to_string());
        assert!(filter.matches(&job));

        filter.state = Some(JobState::Running);
        assert!(!filter.matches(&job));

        filter.state = None;
        filter.project = Some("other".to_string());
        assert!(!filter.matches(&job));
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JobState::Scheduled).unwrap(),
            serde_json::json!("scheduled")
        );
        assert_eq!(JobState::Interrupted.to_string(), "interrupted");
    }
}
