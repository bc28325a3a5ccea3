//! Job scheduling and execution for document-processing pipelines.
//!
//! The scheduler admits jobs built from validated submissions, runs
//! their providers on bounded worker pools with per-target
//! serialization, and retains terminal jobs for status queries. Jobs
//! come in three kinds: project-scoped tasks, sandbox-scoped tasks
//! (with snapshot bookkeeping), and model trainings.

pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod store;
pub mod task;
pub mod training;

pub use config::{ConfigError, SchedulerConfig};
pub use error::ScheduleError;
pub use job::{Job, JobFilter, JobState, JobTarget, JobView, Processing, WorkerCategory};
pub use metrics::SchedulerMetrics;
pub use provider::{
    ArgKind, ArgSpec, CancelToken, CoreData, JobMonitor, ProcessContext, ProcessServiceProvider,
    Processor, ProviderModel, RunOutcome, Trainer, TrainingContext, TrainingServiceProvider,
    WorkspacePaths,
};
pub use registry::{ProviderDescriptor, ProviderKind, ProviderRegistry};
pub use runner::Scheduler;
pub use task::{ProjectTaskRequest, SandboxTaskRequest};
pub use training::TrainingRequest;
