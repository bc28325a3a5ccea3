//! Contracts to the surrounding platform: snapshot trees, the model
//! registry, and the project/sandbox directory.
//!
//! The scheduler consumes these traits and never assumes a concrete
//! backing. [`memory`] provides the in-memory implementations used by
//! tests and single-node runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use scriptorium_core::{CollectionId, ModelId, ProjectId, SandboxId, SnapshotTrack, UserId};

pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("sandbox not found: {0}/{1}")]
    SandboxNotFound(ProjectId, SandboxId),

    #[error("snapshot not found at track {0}")]
    SnapshotNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("{0}")]
    Backend(String),
}

/// Join a track into its display form, e.g. `1.2.3`.
pub fn track_label(track: &SnapshotTrack) -> String {
    track
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Kind of artifact a snapshot holds, following the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Import,
    Preprocessing,
    Layout,
    Recognition,
    Correction,
    Export,
    Tool,
}

/// One node in a sandbox's snapshot tree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub track: SnapshotTrack,
    pub kind: SnapshotKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Read-only marker. Once set it is never cleared.
    pub locked: bool,
}

/// Request to materialize a snapshot under a parent.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub parent: SnapshotTrack,
    pub kind: SnapshotKind,
    pub label: String,
    pub description: Option<String>,
}

/// Lifecycle state of a model entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    /// Registered, training not yet finished.
    Created,
    /// Training completed.
    Trained,
    /// Training ended without completing. The entity is kept so the
    /// failure stays visible.
    Failed,
}

/// A recognition model tracked by the model registry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelEntity {
    pub id: ModelId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub state: ModelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Availability of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    Active,
    Closed,
}

/// Availability of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Active,
    /// Frozen; only callers with the special right may run jobs on it.
    Secured,
}

/// Snapshot tree access, scoped per sandbox.
pub trait SnapshotStore: Send + Sync {
    /// Resolve an existing snapshot by its track.
    fn resolve(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        track: &SnapshotTrack,
    ) -> Result<Snapshot, StoreError>;

    /// Materialize a child snapshot under `spec.parent`, assigning the
    /// next free child index. Either the snapshot exists afterwards or
    /// the error left the tree untouched.
    fn create(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        spec: &NewSnapshot,
        user: Option<&UserId>,
    ) -> Result<Snapshot, StoreError>;

    /// Mark a snapshot read-only. Locking twice is a no-op.
    fn lock(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        track: &SnapshotTrack,
    ) -> Result<(), StoreError>;
}

/// Registry of model entities produced by trainings.
pub trait ModelStore: Send + Sync {
    /// Register a model shell ahead of its training run.
    fn create(
        &self,
        name: &str,
        description: Option<&str>,
        keywords: &[String],
        user: Option<&UserId>,
    ) -> Result<ModelEntity, StoreError>;

    fn get(&self, id: ModelId) -> Result<ModelEntity, StoreError>;

    /// Flip a model to `trained` after a successful run.
    fn mark_trained(&self, id: ModelId) -> Result<(), StoreError>;

    /// Flip a model to `failed`, recording why. The entity is kept.
    fn mark_failed(&self, id: ModelId, reason: &str) -> Result<(), StoreError>;
}

/// Directory of projects, sandboxes, and ground-truth collections.
pub trait WorkspaceDirectory: Send + Sync {
    /// `None` when the project is unknown.
    fn project_state(&self, project: &ProjectId) -> Option<ProjectState>;

    /// `None` when the sandbox (or its project) is unknown.
    fn sandbox_state(&self, project: &ProjectId, sandbox: &SandboxId) -> Option<SandboxState>;

    fn collection_exists(&self, collection: &CollectionId) -> bool;

    /// Whether `user` may read the collection.
    fn collection_readable(&self, collection: &CollectionId, user: Option<&UserId>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_label_joins_indices() {
        assert_eq!(track_label(&vec![1]), "1");
        assert_eq!(track_label(&vec![1, 2, 3]), "1.2.3");
        assert_eq!(track_label(&Vec::new()), "");
    }
}
