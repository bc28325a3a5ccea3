//! Provider SPI: the seam between the scheduler and the processing
//! implementations it runs.
//!
//! A provider describes a capability (id, name, argument model, data
//! scope) and builds a fresh [`Processor`] or [`Trainer`] per job. The
//! scheduler owns everything else: state, threads, cancellation, and
//! snapshot bookkeeping.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use scriptorium_core::{CollectionId, ModelId, ProjectId};

use crate::job::JobTarget;
use crate::store::{Snapshot, SnapshotKind};

/// Scope of core data a process provider operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CoreData {
    Project,
    Sandbox,
}

/// Value type of one provider argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Text,
    Integer,
    Float,
    Boolean,
}

impl ArgKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgKind::Text => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Float => value.is_number(),
            ArgKind::Boolean => value.is_boolean(),
        }
    }
}

/// One declared argument of a provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArgSpec {
    pub key: String,
    pub kind: ArgKind,
    #[serde(default)]
    pub required: bool,
}

/// Declared argument model of a provider. Submissions are checked
/// against it before a job is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProviderModel {
    pub args: Vec<ArgSpec>,
}

impl ProviderModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, key: &str, kind: ArgKind, required: bool) -> Self {
        self.args.push(ArgSpec {
            key: key.to_string(),
            kind,
            required,
        });
        self
    }

    /// Check a submitted argument object against the model. `null` is
    /// treated as an empty object. Unknown keys are rejected.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let map = match args {
            Value::Null => {
                if let Some(missing) = self.args.iter().find(|a| a.required) {
                    return Err(format!("missing required argument '{}'", missing.key));
                }
                return Ok(());
            }
            Value::Object(map) => map,
            _ => return Err("arguments must be a JSON object".to_string()),
        };
        for spec in &self.args {
            match map.get(&spec.key) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(format!("missing required argument '{}'", spec.key));
                    }
                }
                Some(value) => {
                    if !spec.kind.accepts(value) {
                        return Err(format!(
                            "argument '{}' must be of type {:?}",
                            spec.key, spec.kind
                        ));
                    }
                }
            }
        }
        for key in map.keys() {
            if !self.args.iter().any(|a| &a.key == key) {
                return Err(format!("unknown argument '{}'", key));
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between the scheduler and a
/// running processor. Once raised it never resets.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Callbacks a running processor uses to report back into its job.
pub trait JobMonitor: Sync {
    /// Report overall progress in `0.0..=1.0`.
    fn progress(&self, fraction: f64);

    /// Append a line to the job journal.
    fn log(&self, line: &str);

    /// Ask the scheduler to mark the job's snapshot read-only. Ignored
    /// for jobs that did not materialize a snapshot.
    fn request_snapshot_lock(&self);
}

/// Filesystem layout a processor may read and write.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    /// Workspace data root.
    pub root: PathBuf,
    /// `<root>/projects/<project>`.
    pub project: PathBuf,
    /// `<root>/projects/<project>/sandboxes/<sandbox>`, when sandbox-scoped.
    pub sandbox: Option<PathBuf>,
    /// `<root>/models/<model>`, when training.
    pub model: Option<PathBuf>,
}

impl WorkspacePaths {
    pub fn for_target(root: &Path, target: &JobTarget) -> Self {
        let project = root.join("projects").join(&target.project);
        let sandbox = target
            .sandbox
            .as_ref()
            .map(|s| project.join("sandboxes").join(s));
        Self {
            root: root.to_path_buf(),
            project,
            sandbox,
            model: None,
        }
    }

    pub fn for_training(root: &Path, project: &ProjectId, model: ModelId) -> Self {
        Self {
            root: root.to_path_buf(),
            project: root.join("projects").join(project),
            sandbox: None,
            model: Some(root.join("models").join(model.to_string())),
        }
    }
}

/// Result of a processor or trainer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Work finished normally.
    Completed,
    /// Work gave up; the reason is surfaced on the job.
    Interrupted { reason: String },
    /// Work observed the cancel token and unwound cleanly.
    Canceled,
}

/// Environment handed to a process run.
pub struct ProcessContext<'a> {
    pub target: &'a JobTarget,
    pub args: &'a Value,
    pub paths: WorkspacePaths,
    /// Snapshot materialized for this run (sandbox scope only).
    pub snapshot: Option<&'a Snapshot>,
    pub cancel: &'a CancelToken,
    pub monitor: &'a dyn JobMonitor,
}

/// Environment handed to a training run.
pub struct TrainingContext<'a> {
    pub project: &'a ProjectId,
    pub args: &'a Value,
    pub dataset: &'a [CollectionId],
    pub model: ModelId,
    pub paths: WorkspacePaths,
    pub cancel: &'a CancelToken,
    pub monitor: &'a dyn JobMonitor,
}

/// A single run of a process provider. One fresh instance per job.
pub trait Processor: Send {
    fn run(&mut self, ctx: ProcessContext<'_>) -> RunOutcome;
}

/// A single training run. One fresh instance per job.
pub trait Trainer: Send {
    fn run(&mut self, ctx: TrainingContext<'_>) -> RunOutcome;
}

/// A registered processing capability over project or sandbox data.
pub trait ProcessServiceProvider: Send + Sync {
    /// Stable identifier used in submissions and metrics.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Scope of data this provider operates on.
    fn core_data(&self) -> CoreData;

    /// Kind of snapshot a sandbox-scoped run materializes.
    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::Tool
    }

    /// Declared argument model.
    fn model(&self) -> ProviderModel;

    /// Build a fresh processor for one job.
    fn processor(&self) -> Box<dyn Processor>;
}

/// A registered training capability.
pub trait TrainingServiceProvider: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn model(&self) -> ProviderModel;

    /// Build a fresh trainer for one job.
    fn trainer(&self) -> Box<dyn Trainer>;
}
