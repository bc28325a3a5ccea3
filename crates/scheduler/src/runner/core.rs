use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::info;

use scriptorium_core::JobId;

use crate::config::SchedulerConfig;
use crate::job::{Job, TargetKey, WorkerCategory};
use crate::metrics::SchedulerMetrics;
use crate::store::{ModelStore, SnapshotStore, WorkspaceDirectory};

/// Serial slot of one target. While `holder` is set, further serial
/// jobs on the target park in `waiting` and occupy no worker thread.
#[derive(Default)]
pub(super) struct TargetGate {
    pub(super) holder: Option<JobId>,
    pub(super) waiting: VecDeque<JobId>,
}

/// One rayon pool per worker category.
pub(super) struct WorkerPools {
    pub(super) tasks: rayon::ThreadPool,
    pub(super) workflows: rayon::ThreadPool,
    pub(super) trainings: rayon::ThreadPool,
}

impl WorkerPools {
    pub(super) fn for_category(&self, category: WorkerCategory) -> &rayon::ThreadPool {
        match category {
            WorkerCategory::Tasks => &self.tasks,
            WorkerCategory::Workflows => &self.workflows,
            WorkerCategory::Trainings => &self.trainings,
        }
    }
}

/// Shared handles a worker needs while running a job. Cheap to clone
/// into pool closures.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub(super) jobs: Arc<RwLock<HashMap<JobId, Arc<Job>>>>,
    pub(super) gates: Arc<Mutex<HashMap<TargetKey, TargetGate>>>,
    pub(super) pools: Arc<WorkerPools>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) directory: Arc<dyn WorkspaceDirectory>,
    pub(super) snapshots: Arc<dyn SnapshotStore>,
    pub(super) models: Arc<dyn ModelStore>,
    pub(super) data_dir: PathBuf,
    pub(super) journal_lines: usize,
}

/// The job scheduler. Admits jobs, enforces per-target serialization,
/// runs processors on bounded worker pools, and retains terminal jobs
/// for status queries until eviction.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    /// Job table; terminal entries stay queryable until evicted.
    pub(super) jobs: Arc<RwLock<HashMap<JobId, Arc<Job>>>>,
    /// Serial slot per target, with parked followers.
    pub(super) gates: Arc<Mutex<HashMap<TargetKey, TargetGate>>>,
    pub(super) pools: Arc<WorkerPools>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) directory: Arc<dyn WorkspaceDirectory>,
    pub(super) snapshots: Arc<dyn SnapshotStore>,
    pub(super) models: Arc<dyn ModelStore>,
    /// Set once; admissions are refused afterwards.
    pub(super) shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// Create a scheduler with the given config and collaborators. The
    /// worker pools are built eagerly.
    pub fn new(
        config: SchedulerConfig,
        directory: Arc<dyn WorkspaceDirectory>,
        snapshots: Arc<dyn SnapshotStore>,
        models: Arc<dyn ModelStore>,
    ) -> Self {
        let tasks = config.resolved_task_workers();
        let workflows = config.resolved_workflow_workers();
        let trainings = config.resolved_training_workers();
        info!(tasks, workflows, trainings, "scheduler starting worker pools");

        let pools = Arc::new(WorkerPools {
            tasks: build_pool(tasks),
            workflows: build_pool(workflows),
            trainings: build_pool(trainings),
        });

        Self {
            config,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            gates: Arc::new(Mutex::new(HashMap::new())),
            pools,
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            directory,
            snapshots,
            models,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.read().expect("lock poisoned").clone()
    }

    /// Number of jobs currently retained, any state.
    pub fn retained_jobs(&self) -> usize {
        self.jobs.read().expect("lock poisoned").len()
    }

    /// Stop admitting new jobs. Jobs already admitted keep running to
    /// their terminal state.
    pub fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Wait until every retained job is terminal, or the timeout runs
    /// out. Returns whether the scheduler drained.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = {
                let jobs = self.jobs.read().expect("lock poisoned");
                jobs.values().any(|job| !job.state().is_terminal())
            };
            if !pending {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    pub(super) fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            jobs: Arc::clone(&self.jobs),
            gates: Arc::clone(&self.gates),
            pools: Arc::clone(&self.pools),
            metrics: Arc::clone(&self.metrics),
            directory: Arc::clone(&self.directory),
            snapshots: Arc::clone(&self.snapshots),
            models: Arc::clone(&self.models),
            data_dir: self.config.data_dir.clone(),
            journal_lines: self.config.journal_lines,
        }
    }
}

fn build_pool(threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .expect("failed to build worker pool")
}
