//! In-memory stores backing tests and single-node runs.
//!
//! [`MemoryWorkspace`] keeps the project/sandbox directory, snapshot
//! trees, and collections; [`MemoryModels`] keeps the model registry.
//! Both are plain mutex-guarded maps; durability is someone else's job.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use scriptorium_core::{CollectionId, ModelId, ProjectId, SandboxId, SnapshotTrack, UserId};

use super::{
    track_label, ModelEntity, ModelState, ModelStore, NewSnapshot, ProjectState, SandboxState,
    Snapshot, SnapshotKind, SnapshotStore, StoreError, WorkspaceDirectory,
};

struct SandboxEntry {
    state: SandboxState,
    snapshots: HashMap<SnapshotTrack, Snapshot>,
}

impl SandboxEntry {
    fn new(state: SandboxState) -> Self {
        let root = Snapshot {
            track: vec![1],
            kind: SnapshotKind::Import,
            label: "root".to_string(),
            description: None,
            created_by: None,
            created_at: Utc::now(),
            locked: false,
        };
        let mut snapshots = HashMap::new();
        snapshots.insert(root.track.clone(), root);
        Self { state, snapshots }
    }
}

#[derive(Default)]
struct WorkspaceInner {
    projects: HashMap<ProjectId, ProjectState>,
    sandboxes: HashMap<(ProjectId, SandboxId), SandboxEntry>,
    /// Collection id to allowed readers. `None` means readable by anyone.
    collections: HashMap<CollectionId, Option<Vec<UserId>>>,
}

/// Projects, sandboxes, snapshot trees, and collections held in memory.
///
/// Every sandbox starts with a root snapshot at track `[1]`.
#[derive(Default)]
pub struct MemoryWorkspace {
    inner: Mutex<WorkspaceInner>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, id: impl Into<ProjectId>, state: ProjectState) {
        let mut inner = self.inner.lock().expect("workspace lock poisoned");
        inner.projects.insert(id.into(), state);
    }

    pub fn add_sandbox(
        &self,
        project: impl Into<ProjectId>,
        id: impl Into<SandboxId>,
        state: SandboxState,
    ) {
        let mut inner = self.inner.lock().expect("workspace lock poisoned");
        inner
            .sandboxes
            .insert((project.into(), id.into()), SandboxEntry::new(state));
    }

    pub fn add_collection(&self, id: impl Into<CollectionId>, readers: Option<Vec<UserId>>) {
        let mut inner = self.inner.lock().expect("workspace lock poisoned");
        inner.collections.insert(id.into(), readers);
    }

    /// Register projects, sandboxes, and collections found on disk under
    /// `root`: `projects/<p>/`, `projects/<p>/sandboxes/<s>/`, and
    /// `collections/<c>/`. Everything discovered is registered active
    /// and publicly readable.
    pub fn discover(root: &Path) -> std::io::Result<Self> {
        let workspace = Self::new();
        let mut projects = 0usize;
        let mut sandboxes = 0usize;
        let mut collections = 0usize;

        for project_dir in subdirectories(&root.join("projects"))? {
            let project = project_dir.0;
            workspace.add_project(project.clone(), ProjectState::Active);
            projects += 1;
            for sandbox_dir in subdirectories(&project_dir.1.join("sandboxes"))? {
                workspace.add_sandbox(project.clone(), sandbox_dir.0, SandboxState::Active);
                sandboxes += 1;
            }
        }
        for collection_dir in subdirectories(&root.join("collections"))? {
            workspace.add_collection(collection_dir.0, None);
            collections += 1;
        }

        info!(
            root = %root.display(),
            projects, sandboxes, collections,
            "workspace discovered"
        );
        Ok(workspace)
    }
}

/// Names and paths of the subdirectories of `dir`. A missing `dir`
/// yields an empty list.
fn subdirectories(dir: &Path) -> std::io::Result<Vec<(String, std::path::PathBuf)>> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                found.push((name.to_string(), entry.path()));
            }
        }
    }
    found.sort();
    Ok(found)
}

impl WorkspaceDirectory for MemoryWorkspace {
    fn project_state(&self, project: &ProjectId) -> Option<ProjectState> {
        let inner = self.inner.lock().expect("workspace lock poisoned");
        inner.projects.get(project).copied()
    }

    fn sandbox_state(&self, project: &ProjectId, sandbox: &SandboxId) -> Option<SandboxState> {
        let inner = self.inner.lock().expect("workspace lock poisoned");
        inner
            .sandboxes
            .get(&(project.clone(), sandbox.clone()))
            .map(|entry| entry.state)
    }

    fn collection_exists(&self, collection: &CollectionId) -> bool {
        let inner = self.inner.lock().expect("workspace lock poisoned");
        inner.collections.contains_key(collection)
    }

    fn collection_readable(&self, collection: &CollectionId, user: Option<&UserId>) -> bool {
        let inner = self.inner.lock().expect("workspace lock poisoned");
        match inner.collections.get(collection) {
            Some(None) => true,
            Some(Some(readers)) => user.is_some_and(|u| readers.contains(u)),
            None => false,
        }
    }
}

impl SnapshotStore for MemoryWorkspace {
    fn resolve(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        track: &SnapshotTrack,
    ) -> Result<Snapshot, StoreError> {
        let inner = self.inner.lock().expect("workspace lock poisoned");
        let entry = inner
            .sandboxes
            .get(&(project.clone(), sandbox.clone()))
            .ok_or_else(|| StoreError::SandboxNotFound(project.clone(), sandbox.clone()))?;
        entry
            .snapshots
            .get(track)
            .cloned()
            .ok_or_else(|| StoreError::SnapshotNotFound(track_label(track)))
    }

    fn create(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        spec: &NewSnapshot,
        user: Option<&UserId>,
    ) -> Result<Snapshot, StoreError> {
        let mut inner = self.inner.lock().expect("workspace lock poisoned");
        let entry = inner
            .sandboxes
            .get_mut(&(project.clone(), sandbox.clone()))
            .ok_or_else(|| StoreError::SandboxNotFound(project.clone(), sandbox.clone()))?;
        if !entry.snapshots.contains_key(&spec.parent) {
            return Err(StoreError::SnapshotNotFound(track_label(&spec.parent)));
        }

        let next_index = entry
            .snapshots
            .keys()
            .filter(|t| t.len() == spec.parent.len() + 1 && t.starts_with(&spec.parent))
            .filter_map(|t| t.last().copied())
            .max()
            .map_or(1, |i| i + 1);
        let mut track = spec.parent.clone();
        track.push(next_index);

        let snapshot = Snapshot {
            track: track.clone(),
            kind: spec.kind,
            label: spec.label.clone(),
            description: spec.description.clone(),
            created_by: user.cloned(),
            created_at: Utc::now(),
            locked: false,
        };
        entry.snapshots.insert(track, snapshot.clone());
        Ok(snapshot)
    }

    fn lock(
        &self,
        project: &ProjectId,
        sandbox: &SandboxId,
        track: &SnapshotTrack,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("workspace lock poisoned");
        let entry = inner
            .sandboxes
            .get_mut(&(project.clone(), sandbox.clone()))
            .ok_or_else(|| StoreError::SandboxNotFound(project.clone(), sandbox.clone()))?;
        let snapshot = entry
            .snapshots
            .get_mut(track)
            .ok_or_else(|| StoreError::SnapshotNotFound(track_label(track)))?;
        snapshot.locked = true;
        Ok(())
    }
}

/// Model registry held in memory.
#[derive(Default)]
pub struct MemoryModels {
    inner: Mutex<HashMap<ModelId, ModelEntity>>,
}

impl MemoryModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// All registered models, oldest first.
    pub fn list(&self) -> Vec<ModelEntity> {
        let inner = self.inner.lock().expect("models lock poisoned");
        let mut models: Vec<ModelEntity> = inner.values().cloned().collect();
        models.sort_by_key(|m| m.created_at);
        models
    }
}

impl ModelStore for MemoryModels {
    fn create(
        &self,
        name: &str,
        description: Option<&str>,
        keywords: &[String],
        user: Option<&UserId>,
    ) -> Result<ModelEntity, StoreError> {
        let model = ModelEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            keywords: keywords.to_vec(),
            state: ModelState::Created,
            reason: None,
            created_by: user.cloned(),
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().expect("models lock poisoned");
        inner.insert(model.id, model.clone());
        Ok(model)
    }

    fn get(&self, id: ModelId) -> Result<ModelEntity, StoreError> {
        let inner = self.inner.lock().expect("models lock poisoned");
        inner.get(&id).cloned().ok_or(StoreError::ModelNotFound(id))
    }

    fn mark_trained(&self, id: ModelId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("models lock poisoned");
        let model = inner.get_mut(&id).ok_or(StoreError::ModelNotFound(id))?;
        model.state = ModelState::Trained;
        model.reason = None;
        Ok(())
    }

    fn mark_failed(&self, id: ModelId, reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("models lock poisoned");
        let model = inner.get_mut(&id).ok_or(StoreError::ModelNotFound(id))?;
        model.state = ModelState::Failed;
        model.reason = Some(reason.to_string());
        Ok(())
    }
}
