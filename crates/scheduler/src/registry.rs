//! Provider registry: the lookup table the submission surface queries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::provider::{CoreData, ProcessServiceProvider, ProviderModel, TrainingServiceProvider};
use crate::store::SnapshotKind;

/// Family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Process,
    Training,
}

/// Serializable description of one registered provider.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_data: Option<CoreData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_kind: Option<SnapshotKind>,
    pub model: ProviderModel,
}

/// Registered providers, keyed by provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    process: HashMap<String, Arc<dyn ProcessServiceProvider>>,
    training: HashMap<String, Arc<dyn TrainingServiceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process provider. Re-registering an id replaces the
    /// previous provider.
    pub fn register_process(&mut self, provider: Arc<dyn ProcessServiceProvider>) {
        info!(provider = provider.id(), "registered process provider");
        self.process.insert(provider.id().to_string(), provider);
    }

    /// Register a training provider.
    pub fn register_training(&mut self, provider: Arc<dyn TrainingServiceProvider>) {
        info!(provider = provider.id(), "registered training provider");
        self.training.insert(provider.id().to_string(), provider);
    }

    pub fn process(&self, id: &str) -> Option<Arc<dyn ProcessServiceProvider>> {
        self.process.get(id).cloned()
    }

    pub fn training(&self, id: &str) -> Option<Arc<dyn TrainingServiceProvider>> {
        self.training.get(id).cloned()
    }

    /// Descriptions of every registered provider, sorted by id.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let mut all: Vec<ProviderDescriptor> = self
            .process
            .values()
            .map(|p| ProviderDescriptor {
                id: p.id().to_string(),
                name: p.name().to_string(),
                kind: ProviderKind::Process,
                core_data: Some(p.core_data()),
                snapshot_kind: match p.core_data() {
                    CoreData::Sandbox => Some(p.snapshot_kind()),
                    CoreData::Project => None,
                },
                model: p.model(),
            })
            .chain(self.training.values().map(|p| ProviderDescriptor {
                id: p.id().to_string(),
                name: p.name().to_string(),
                kind: ProviderKind::Training,
                core_data: None,
                snapshot_kind: None,
                model: p.model(),
            }))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.process.is_empty() && self.training.is_empty()
    }
}
