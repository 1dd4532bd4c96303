//! Paths of the Docker Registry v2 storage tree
//!
//! ```text
//! <root>/docker/registry/v2/
//!   repositories/<name...>/_manifests/
//!       revisions/sha256/<hex>/
//!       tags/<tag>/current/link
//!   blobs/sha256/<hex[0:2]>/<hex>/data
//! ```

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::digest::{Algorithm, Digest};

/// Directory marking a repository.
pub const MANIFESTS_DIR: &str = "_manifests";

/// Paths within a registry store rooted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    /// Layout of the store rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory the store was configured with.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `docker/registry/v2` below the root.
    pub fn base(&self) -> Utf8PathBuf {
        let mut path = self.root.join("docker");
        path.push("registry");
        path.push("v2");
        path
    }

    /// Root of all repositories.
    pub fn repositories(&self) -> Utf8PathBuf {
        self.base().join("repositories")
    }

    /// Root of all blobs.
    pub fn blobs(&self) -> Utf8PathBuf {
        self.base().join("blobs")
    }

    /// Path of the data file of a blob.
    ///
    /// The store only shards blobs by sha256, so any other algorithm has
    /// no path.
    pub fn blob_data(&self, digest: &Digest) -> Option<Utf8PathBuf> {
        if digest.algorithm() != Algorithm::Sha256 {
            return None;
        }

        let encoded = digest.encoded();
        let mut path = self.blobs();
        path.push(digest.algorithm().as_str());
        path.push(&encoded[..2]);
        path.push(encoded);
        path.push("data");
        Some(path)
    }

    /// Revision directories of the repository at `repository`.
    pub fn revisions(repository: &Utf8Path) -> Utf8PathBuf {
        let mut path = repository.join(MANIFESTS_DIR);
        path.push("revisions");
        path.push(Algorithm::Sha256.as_str());
        path
    }

    /// Tag directories of the repository at `repository`.
    pub fn tags(repository: &Utf8Path) -> Utf8PathBuf {
        repository.join(MANIFESTS_DIR).join("tags")
    }

    /// The link file naming the revision a tag currently points at.
    pub fn tag_link(repository: &Utf8Path, tag: &str) -> Utf8PathBuf {
        let mut path = Self::tags(repository);
        path.push(tag);
        path.push("current");
        path.push("link");
        path
    }
}

/// Names of the subdirectories of `path`, sorted.
///
/// A missing directory has no subdirectories. Entries whose names are not
/// UTF-8 are skipped.
pub(crate) fn subdirectories(path: &Utf8Path) -> io::Result<Vec<String>> {
    let entries = match path.read_dir_utf8() {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(%path, "Skipping entry with non UTF-8 name");
                continue;
            }
            Err(err) => return Err(err),
        };
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_owned());
        }
    }
    names.sort();
    Ok(names)
}
