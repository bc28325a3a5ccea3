//! Provider registry listing.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use scriptorium_scheduler::ProviderDescriptor;

use crate::state::AppState;

/// List registered providers with their argument models, sorted by id.
#[utoipa::path(
    get,
    path = "/providers",
    tag = "Providers",
    responses(
        (status = 200, description = "Registered providers", body = Vec<ProviderDescriptor>)
    )
)]
pub(crate) async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ProviderDescriptor>> {
    Json(state.registry.descriptors())
}
