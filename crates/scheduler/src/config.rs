use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error loading a scheduler config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads for project-scoped tasks. 0 = available parallelism.
    #[serde(default = "default_task_workers")]
    pub task_workers: usize,
    /// Worker threads for sandbox workflows. Minimum 1.
    #[serde(default = "default_workflow_workers")]
    pub workflow_workers: usize,
    /// Worker threads for trainings. Minimum 1.
    #[serde(default = "default_training_workers")]
    pub training_workers: usize,
    /// Maximum jobs retained at once. When the table is full, the oldest
    /// terminal job is evicted to admit new work; if every retained job
    /// is still active the submission is rejected as saturated.
    #[serde(default = "default_max_live_jobs")]
    pub max_live_jobs: usize,
    /// Seconds a terminal job stays queryable before eviction.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
    /// Seconds a job may run before its cancel token is raised.
    /// 0 disables the deadline.
    #[serde(default)]
    pub deadline_seconds: u64,
    /// Maximum journal lines kept per job.
    #[serde(default = "default_journal_lines")]
    pub journal_lines: usize,
    /// Workspace data root processors operate under.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_task_workers() -> usize {
    0
}
fn default_workflow_workers() -> usize {
    2
}
fn default_training_workers() -> usize {
    1
}
fn default_max_live_jobs() -> usize {
    256
}
fn default_retention_seconds() -> u64 {
    3600
}
fn default_journal_lines() -> usize {
    100
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_workers: default_task_workers(),
            workflow_workers: default_workflow_workers(),
            training_workers: default_training_workers(),
            max_live_jobs: default_max_live_jobs(),
            retention_seconds: default_retention_seconds(),
            deadline_seconds: 0,
            journal_lines: default_journal_lines(),
            data_dir: default_data_dir(),
        }
    }
}

impl SchedulerConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Resolve task worker count (0 means use available parallelism).
    pub fn resolved_task_workers(&self) -> usize {
        if self.task_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.task_workers
        }
    }

    pub fn resolved_workflow_workers(&self) -> usize {
        self.workflow_workers.max(1)
    }

    pub fn resolved_training_workers(&self) -> usize {
        self.training_workers.max(1)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    /// `None` when the deadline is disabled.
    pub fn deadline(&self) -> Option<Duration> {
        if self.deadline_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.deadline_seconds))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.task_workers, 0);
        assert_eq!(config.workflow_workers, 2);
        assert_eq!(config.training_workers, 1);
        assert_eq!(config.max_live_jobs, 256);
        assert_eq!(config.retention_seconds, 3600);
        assert_eq!(config.deadline_seconds, 0);
        assert_eq!(config.journal_lines, 100);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn resolved_worker_counts() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_task_workers() > 0);
        config.task_workers = 8;
        assert_eq!(config.resolved_task_workers(), 8);

        config.workflow_workers = 0;
        assert_eq!(config.resolved_workflow_workers(), 1);
        config.training_workers = 3;
        assert_eq!(config.resolved_training_workers(), 3);
    }

    #[test]
    fn deadline_zero_is_disabled() {
        let mut config = SchedulerConfig::default();
        assert!(config.deadline().is_none());
        config.deadline_seconds = 90;
        assert_eq!(config.deadline(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn from_file_fills_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "task_workers = 2\nretention_seconds = 60\ndata_dir = \"/tmp/ws\""
        )
        .unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.task_workers, 2);
        assert_eq!(config.retention_seconds, 60);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ws"));
        // untouched keys keep their defaults
        assert_eq!(config.workflow_workers, 2);
        assert_eq!(config.max_live_jobs, 256);
    }

    #[test]
    fn from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "task_workers = \"many\"").unwrap();
        assert!(matches!(
            SchedulerConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
