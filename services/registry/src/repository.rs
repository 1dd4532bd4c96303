//! Revisions and tags of a single repository

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use echocache::{Loaded, Snapshot};
use tracing::Instrument;

use crate::digest::{Algorithm, Digest, DigestError};
use crate::error::{InternalError, InternalKind, RegistryError, RegistryResult};
use crate::layout::{Layout, subdirectories};

/// A human readable name pointing at a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name, e.g. `latest`
    pub name: String,

    /// The revision the tag currently points at
    pub digest: Digest,
}

/// A manifest or index stored as a revision of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Digest of the manifest blob
    pub digest: Digest,

    /// Tags pointing at this revision, by name
    pub tags: Vec<Tag>,
}

impl Revision {
    fn new(digest: Digest) -> Self {
        Self {
            digest,
            tags: Vec::new(),
        }
    }

    /// Names of the tags pointing at this revision.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|tag| tag.name.as_str())
    }
}

/// Snapshot of the revisions of a repository, keyed by digest.
#[derive(Debug, Default)]
pub struct RevisionIndex {
    revisions: BTreeMap<String, Revision>,
}

impl RevisionIndex {
    /// Revisions ordered by digest.
    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.values()
    }

    /// Look up a revision.
    pub fn get(&self, digest: &Digest) -> Option<&Revision> {
        self.revisions.get(&digest.to_string())
    }

    /// Number of revisions.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Whether the repository has no revisions.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    name: String,
    path: Utf8PathBuf,
    index: Snapshot<RevisionIndex>,
}

/// A repository of the store.
///
/// Cloning is cheap and clones share the revision cache. The cache is
/// rebuilt from disk on first use and whenever it is older than the
/// repository TTL.
#[derive(Debug, Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    pub(crate) fn new(name: String, path: Utf8PathBuf, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                path,
                index: Snapshot::new(ttl),
            }),
        }
    }

    /// Repository name, `/` separated.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Directory of the repository.
    pub fn path(&self) -> &Utf8Path {
        &self.inner.path
    }

    /// Number of times the revision index was loaded.
    pub fn loads(&self) -> u64 {
        self.inner.index.loads()
    }

    /// Whether the revision index has been loaded and is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.inner.index.fresh().is_some()
    }

    /// Rebuild the revision index now.
    pub async fn load(&self) -> RegistryResult<Arc<Loaded<RevisionIndex>>> {
        self.inner.index.refresh(|| self.scan()).await
    }

    /// The revision index, rebuilt first if it has expired.
    pub async fn index(&self) -> RegistryResult<Arc<Loaded<RevisionIndex>>> {
        self.inner.index.get(|| self.scan()).await
    }

    /// All revisions, ordered by digest.
    pub async fn revisions(&self) -> RegistryResult<Vec<(Digest, Revision)>> {
        let index = self.index().await?;
        Ok(index
            .iter()
            .map(|revision| (revision.digest.clone(), revision.clone()))
            .collect())
    }

    /// A single revision.
    pub async fn revision(&self, digest: &Digest) -> RegistryResult<Revision> {
        let index = self.index().await?;
        index
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::RevisionNotFound(digest.clone()))
    }

    async fn scan(&self) -> RegistryResult<RevisionIndex> {
        let path = self.inner.path.clone();
        let index = tokio::task::spawn_blocking(move || scan_revisions(&path))
            .in_current_span()
            .await
            .map_err(|err| {
                tracing::error!(repository = %self.name(), error = %err, "Revision scan did not complete");
                InternalError::new(InternalKind::Task)
            })?
            .map_err(|err| {
                tracing::error!(repository = %self.name(), error = %err, "Failed to scan repository");
                InternalError::new(InternalKind::Io)
            })?;

        tracing::debug!(
            repository = %self.name(),
            revisions = index.len(),
            "Loaded repository revisions"
        );
        Ok(index)
    }
}

#[derive(Debug, thiserror::Error)]
enum LinkError {
    #[error("reading link: {0}")]
    Io(#[from] io::Error),

    #[error("link content: {0}")]
    Digest(#[from] DigestError),
}

fn read_link(path: &Utf8Path) -> Result<Digest, LinkError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.trim_end().parse()?)
}

/// Build the revision index of the repository at `path`.
///
/// Revision directories with names that are not sha256 hashes, tags whose
/// link cannot be read or parsed, and tags pointing at a digest which is
/// not a revision are skipped with a warning.
#[tracing::instrument(level = "debug")]
fn scan_revisions(path: &Utf8Path) -> io::Result<RevisionIndex> {
    let mut revisions = BTreeMap::new();
    for name in subdirectories(&Layout::revisions(path))? {
        match Digest::from_raw(Algorithm::Sha256, name.as_str()) {
            Ok(digest) => {
                revisions.insert(digest.to_string(), Revision::new(digest));
            }
            Err(err) => {
                tracing::warn!(revision = %name, error = %err, "Skipping revision directory")
            }
        }
    }

    for name in subdirectories(&Layout::tags(path))? {
        let digest = match read_link(&Layout::tag_link(path, &name)) {
            Ok(digest) => digest,
            Err(err) => {
                tracing::warn!(tag = %name, error = %err, "Skipping tag with unusable link");
                continue;
            }
        };

        match revisions.get_mut(&digest.to_string()) {
            Some(revision) => revision.tags.push(Tag { name, digest }),
            None => {
                tracing::warn!(tag = %name, %digest, "Skipping tag pointing at unknown revision")
            }
        }
    }

    Ok(RevisionIndex { revisions })
}
