//! HTTP routes for browsing the registry

use axum::Router;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::error::RegistryResult;
use crate::registry::Registry;
use crate::view::{ManifestView, RepositoryList, RepositoryView};

/// Build the explorer router.
///
/// Returns a Router that can be served with any tower-compatible server.
/// Static assets, if any, are mounted by the caller as a fallback.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/repositories", get(list_repositories))
        .route("/repositories/{*name}", get(get_repository))
        .route("/revisions/{revision}/repository/{*name}", get(get_revision))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// List all repositories
async fn list_repositories(State(registry): State<Registry>) -> RegistryResult<Json<RepositoryList>> {
    Ok(Json(registry.repository_names().await?))
}

/// Revisions and tags of a repository
async fn get_repository(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> RegistryResult<Json<RepositoryView>> {
    Ok(Json(registry.repository_view(&name).await?))
}

/// Summary of a single revision
async fn get_revision(
    State(registry): State<Registry>,
    Path((revision, name)): Path<(String, String)>,
) -> RegistryResult<Json<ManifestView>> {
    Ok(Json(registry.describe(&name, &revision).await?))
}
