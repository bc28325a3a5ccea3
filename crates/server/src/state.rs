//! Shared application state handed to every handler.

use std::sync::Arc;

use scriptorium_scheduler::store::{ModelStore, SnapshotStore, WorkspaceDirectory};
use scriptorium_scheduler::{ProviderRegistry, Scheduler};

/// Everything the HTTP layer needs: the scheduler plus the collaborators
/// it was constructed with, so submission handlers can run their checks
/// against the same stores the workers use.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<ProviderRegistry>,
    pub directory: Arc<dyn WorkspaceDirectory>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub models: Arc<dyn ModelStore>,
}
