//! Content addressable blob access

use std::io;

use camino::Utf8PathBuf;

use crate::digest::Digest;
use crate::error::{InternalError, InternalKind, RegistryError, RegistryResult};
use crate::layout::Layout;

/// Raw blob content, read from disk on every access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    digest: Digest,
    content: Vec<u8>,
}

impl Blob {
    /// Digest the blob was requested by.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The blob bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Take the blob bytes.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

/// Reads blobs out of the store.
///
/// Nothing is cached: each call reads the whole file, so memory use does
/// not grow with the number or size of blobs served.
#[derive(Debug, Clone)]
pub struct BlobStore {
    layout: Layout,
}

impl BlobStore {
    /// Blob store for the given layout.
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Path of the data file of a blob.
    ///
    /// The store only holds sha256 blobs; asking for any other algorithm is
    /// a bug in the caller.
    pub fn path(&self, digest: &Digest) -> RegistryResult<Utf8PathBuf> {
        self.layout.blob_data(digest).ok_or_else(|| {
            tracing::error!(%digest, "Blob store only addresses sha256 digests");
            InternalError::new(InternalKind::Digest).into()
        })
    }

    /// Read a blob.
    #[tracing::instrument(skip(self), fields(%digest))]
    pub async fn blob(&self, digest: &Digest) -> RegistryResult<Blob> {
        let path = self.path(digest)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Blob {
                digest: digest.clone(),
                content,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(RegistryError::BlobNotFound(digest.clone()))
            }
            Err(err) => {
                tracing::error!(%digest, %path, error = %err, "Failed to read blob");
                Err(InternalError::new(InternalKind::Io).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Store;

    #[tokio::test]
    async fn reads_blob_content() {
        let store = Store::new();
        let digest = store.put_blob(b"hello blob");

        let blob = BlobStore::new(store.layout()).blob(&digest).await.unwrap();
        assert_eq!(blob.digest(), &digest);
        assert_eq!(blob.content(), b"hello blob");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = Store::new();
        let digest = Store::digest_of(b"never written");

        let err = BlobStore::new(store.layout()).blob(&digest).await.unwrap_err();
        assert!(matches!(err, RegistryError::BlobNotFound(d) if d == digest));
    }

    #[tokio::test]
    async fn directory_in_place_of_data_is_internal() {
        let store = Store::new();
        let digest = Store::digest_of(b"a directory");
        let path = store.layout().blob_data(&digest).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        let err = BlobStore::new(store.layout()).blob(&digest).await.unwrap_err();
        assert_eq!(
            err.as_internal().map(InternalError::kind),
            Some(InternalKind::Io)
        );
        assert!(!err.to_string().contains(path.as_str()));
    }

    #[tokio::test]
    async fn sha512_is_internal() {
        let store = Store::new();
        let digest: Digest = format!("sha512:{}", "ef".repeat(64)).parse().unwrap();

        let err = BlobStore::new(store.layout()).blob(&digest).await.unwrap_err();
        assert_eq!(
            err.as_internal().map(InternalError::kind),
            Some(InternalKind::Digest)
        );
    }
}
