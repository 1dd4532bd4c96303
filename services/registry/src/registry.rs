//! The registry store and its repository listing

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use echocache::{Loaded, Snapshot};
use tracing::Instrument;

use crate::blob::BlobStore;
use crate::config::RegistryConfig;
use crate::error::{InternalError, InternalKind, RegistryError, RegistryResult};
use crate::layout::{Layout, MANIFESTS_DIR, subdirectories};
use crate::repository::{Repository, RevisionIndex};

/// Snapshot of the repositories in the store, keyed by name.
#[derive(Debug, Default)]
pub struct RepositoryListing {
    repositories: BTreeMap<String, Repository>,
}

impl RepositoryListing {
    /// Repository names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }

    /// Look up a repository by name.
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.get(name)
    }

    /// Repositories in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.values()
    }

    /// Number of repositories.
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Whether the store holds no repositories.
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    layout: Layout,
    blobs: BlobStore,
    repository_ttl: Duration,
    listing: Snapshot<RepositoryListing>,
}

/// Read-only view of a Docker Registry v2 store on disk.
///
/// The repository listing and each repository's revisions are cached
/// separately, each with its own TTL. Blobs are never cached.
///
/// Cloning is cheap and clones share all caches.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Registry over the store described by `config`.
    ///
    /// Nothing is read until the first request.
    pub fn new(config: RegistryConfig) -> Self {
        let layout = Layout::new(config.root().to_owned());
        tracing::debug!(root = %layout.root(), "Opening registry store");
        Self {
            inner: Arc::new(Inner {
                blobs: BlobStore::new(layout.clone()),
                layout,
                repository_ttl: config.repository_ttl(),
                listing: Snapshot::new(config.registry_ttl()),
            }),
        }
    }

    /// Paths of the store.
    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    /// Blob access for the store.
    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    /// Number of times the repository listing was loaded.
    pub fn loads(&self) -> u64 {
        self.inner.listing.loads()
    }

    /// Rescan the repository listing now.
    pub async fn load(&self) -> RegistryResult<Arc<Loaded<RepositoryListing>>> {
        self.inner.listing.refresh(|| self.scan()).await
    }

    /// The repository listing, rescanned first if it has expired.
    pub async fn repositories(&self) -> RegistryResult<Arc<Loaded<RepositoryListing>>> {
        self.inner.listing.get(|| self.scan()).await
    }

    /// A repository by name, with its revisions loaded.
    pub async fn repository(&self, name: &str) -> RegistryResult<Repository> {
        let (repository, _) = self.repository_index(name).await?;
        Ok(repository)
    }

    /// A repository by name, together with the revision index loaded for it.
    ///
    /// Callers answering a request from the index should read this snapshot
    /// rather than asking the repository again, which may rescan it.
    pub async fn repository_index(
        &self,
        name: &str,
    ) -> RegistryResult<(Repository, Arc<Loaded<RevisionIndex>>)> {
        let listing = self.repositories().await?;
        let repository = listing
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::RepositoryNotFound(name.to_owned()))?;
        let index = repository.index().await?;
        Ok((repository, index))
    }

    async fn scan(&self) -> RegistryResult<RepositoryListing> {
        let root = self.inner.layout.repositories();
        let ttl = self.inner.repository_ttl;

        let names = tokio::task::spawn_blocking(move || scan_repositories(&root))
            .in_current_span()
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Repository scan did not complete");
                InternalError::new(InternalKind::Task)
            })?
            .map_err(|err| {
                tracing::error!(error = %err, "Failed to scan repositories");
                InternalError::new(InternalKind::Io)
            })?;

        // Every rescan starts each repository over with an unloaded index.
        let repositories = names
            .into_iter()
            .map(|name| {
                let path = self.inner.layout.repositories().join(&name);
                (name.clone(), Repository::new(name, path, ttl))
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(repositories = repositories.len(), "Loaded repository listing");
        Ok(RepositoryListing { repositories })
    }
}

/// Names of all repositories below `root`.
///
/// A directory is a repository when it contains `_manifests`. The walk
/// continues below repositories, since names nest (`library` and
/// `library/alpine` may both exist), but never descends into directories
/// starting with `_`. Directories below the root which cannot be read are
/// skipped with a warning.
#[tracing::instrument(level = "debug")]
fn scan_repositories(root: &Utf8Path) -> io::Result<Vec<String>> {
    if !root.is_dir() {
        tracing::warn!(%root, "Repository directory does not exist");
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    visit(root, "", &mut found)?;
    found.sort();
    Ok(found)
}

fn visit(dir: &Utf8Path, name: &str, found: &mut Vec<String>) -> io::Result<()> {
    let children = match subdirectories(dir) {
        Ok(children) => children,
        Err(err) if !name.is_empty() => {
            tracing::warn!(%dir, error = %err, "Skipping unreadable directory");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    if !name.is_empty() && children.iter().any(|child| child == MANIFESTS_DIR) {
        found.push(name.to_owned());
    }

    for child in children.iter().filter(|child| !child.starts_with('_')) {
        let child_name = if name.is_empty() {
            child.clone()
        } else {
            format!("{name}/{child}")
        };
        visit(&dir.join(child), &child_name, found)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Store;

    fn registry(store: &Store, registry_ttl: Duration, repository_ttl: Duration) -> Registry {
        Registry::new(
            store
                .config()
                .with_registry_ttl(registry_ttl)
                .with_repository_ttl(repository_ttl),
        )
    }

    const LONG: Duration = Duration::from_secs(60);
    const SHORT: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn finds_nested_repositories() {
        let store = Store::new();
        store.add_repository("library/alpine");
        store.add_repository("library");
        store.add_repository("team/tools/builder");
        std::fs::create_dir_all(store.repository_path("not/a/repository")).unwrap();

        let registry = Registry::new(store.config());
        let listing = registry.repositories().await.unwrap();
        assert_eq!(
            listing.names().collect::<Vec<_>>(),
            ["library", "library/alpine", "team/tools/builder"]
        );
    }

    #[tokio::test]
    async fn skips_underscore_directories() {
        let store = Store::new();
        store.add_repository("app");
        // Looks like a repository, but lives below `_manifests`.
        std::fs::create_dir_all(
            store
                .repository_path("app")
                .join(MANIFESTS_DIR)
                .join("nested")
                .join(MANIFESTS_DIR),
        )
        .unwrap();
        std::fs::create_dir_all(store.repository_path("_uploads").join(MANIFESTS_DIR)).unwrap();

        let registry = Registry::new(store.config());
        let listing = registry.repositories().await.unwrap();
        assert_eq!(listing.names().collect::<Vec<_>>(), ["app"]);
    }

    #[tokio::test]
    async fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().join("nowhere")).unwrap();

        let registry = Registry::new(RegistryConfig::new(root));
        assert!(registry.repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_repository() {
        let store = Store::new();
        store.add_repository("app");

        let registry = Registry::new(store.config());
        let err = registry.repository("library/missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::RepositoryNotFound(name) if name == "library/missing"));
    }

    #[tokio::test]
    async fn scans_once_per_ttl() {
        let store = Store::new();
        store.add_repository("first");

        let registry = registry(&store, SHORT, LONG);
        assert_eq!(registry.repositories().await.unwrap().len(), 1);

        store.add_repository("second");
        store.remove_repository("first");

        // Still fresh: the listing does not change.
        let listing = registry.repositories().await.unwrap();
        assert_eq!(listing.names().collect::<Vec<_>>(), ["first"]);
        assert_eq!(registry.loads(), 1);

        tokio::time::sleep(SHORT * 3).await;

        let listing = registry.repositories().await.unwrap();
        assert_eq!(listing.names().collect::<Vec<_>>(), ["second"]);
        assert_eq!(registry.loads(), 2);
    }

    #[tokio::test]
    async fn load_forces_rescan() {
        let store = Store::new();
        let registry = Registry::new(store.config());
        assert!(registry.repositories().await.unwrap().is_empty());

        store.add_repository("app");
        assert!(registry.repositories().await.unwrap().is_empty());
        assert_eq!(registry.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repository_ttl_is_independent() {
        let store = Store::new();
        let first = Store::digest_of(b"first");
        let second = Store::digest_of(b"second");
        store.add_revision("app", &first);

        let registry = registry(&store, LONG, SHORT);
        let repository = registry.repository("app").await.unwrap();
        assert_eq!(repository.index().await.unwrap().len(), 1);

        store.add_revision("app", &second);
        tokio::time::sleep(SHORT * 3).await;

        // The repository rescans, the listing does not.
        let repository = registry.repository("app").await.unwrap();
        assert_eq!(repository.index().await.unwrap().len(), 2);
        assert_eq!(repository.loads(), 2);
        assert_eq!(registry.loads(), 1);
    }

    #[tokio::test]
    async fn rescan_discards_repository_caches() {
        let store = Store::new();
        store.add_revision("app", &Store::digest_of(b"rev"));

        let registry = registry(&store, LONG, LONG);
        let before = registry.repository("app").await.unwrap();
        assert_eq!(before.loads(), 1);

        registry.load().await.unwrap();
        let listing = registry.repositories().await.unwrap();
        assert!(!listing.get("app").unwrap().is_fresh());

        let after = registry.repository("app").await.unwrap();
        assert_eq!(after.loads(), 1);
        assert!(after.is_fresh());
        assert_eq!(before.loads(), 1);
    }

    #[test]
    fn unlistable_subtree_is_skipped() {
        let store = Store::new();
        store.add_repository("app");
        let stray = store.repository_path("stray");
        std::fs::write(&stray, b"not a directory").unwrap();

        // Listing a file fails; below the root that only drops the subtree.
        let mut found = Vec::new();
        visit(&stray, "stray", &mut found).unwrap();
        assert!(found.is_empty());

        assert!(visit(&stray, "", &mut found).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let store = Store::new();
        store.add_repository("app");
        let locked = store.repository_path("locked");
        std::fs::create_dir_all(locked.join("inner")).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let registry = Registry::new(store.config());
        let listing = registry.repositories().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(listing.unwrap().names().collect::<Vec<_>>(), ["app"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_scan() {
        let store = Store::new();
        for name in ["a", "b", "c/d"] {
            store.add_repository(name);
        }

        let registry = Registry::new(store.config());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.repositories().await.map(|listing| listing.len())
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 3);
        }
        assert_eq!(registry.loads(), 1);
    }
}
