//! JSON shapes served to the browser

use std::collections::BTreeMap;

use serde::Serialize;

use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::oci::{ImageConfig, ImageIndex, ImageManifest, Manifest};
use crate::registry::Registry;

/// Names of all repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryList {
    /// Sorted repository names
    pub repositories: Vec<String>,
}

/// The revisions of a repository and the tags pointing at each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryView {
    /// Revisions keyed by digest
    pub revisions: BTreeMap<String, RevisionView>,
}

/// Tags of one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionView {
    /// Tag names, sorted
    pub tags: Vec<String>,
}

/// Summary of a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ManifestView {
    /// A multi-platform index
    Index {
        /// The listed manifests
        manifests: Vec<IndexEntry>,
    },

    /// A single-platform image
    Image {
        /// Provenance and size
        metadata: ImageMetadata,
        /// Runtime defaults
        configuration: ImageConfiguration,
        /// Layers, base first
        layers: Vec<LayerView>,
    },
}

/// A manifest listed by an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Digest of the manifest
    pub digest: String,

    /// `os-architecture`, when the index declares a platform
    pub platform: Option<String>,
}

/// Provenance and size of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    /// Creation time from the config
    pub created: Option<String>,

    /// Author from the config
    pub author: Option<String>,

    /// Config plus layer sizes, in bytes
    pub size: u64,

    /// Manifest annotations
    pub annotations: BTreeMap<String, String>,
}

/// Runtime defaults of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageConfiguration {
    /// `NAME=value` pairs
    pub environment: Option<Vec<String>>,

    /// Entrypoint argv
    pub entrypoint: Option<Vec<String>>,

    /// Default arguments
    pub command: Option<Vec<String>>,

    /// Working directory
    pub working_directory: Option<String>,
}

/// A layer of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerView {
    /// Layer media type
    pub media_type: String,

    /// Layer digest
    pub digest: String,

    /// Compressed size in bytes
    pub size: u64,
}

impl ManifestView {
    fn index(index: &ImageIndex) -> Self {
        ManifestView::Index {
            manifests: index
                .manifests
                .iter()
                .map(|descriptor| IndexEntry {
                    digest: descriptor.digest.clone(),
                    platform: descriptor.platform.as_ref().map(|platform| platform.label()),
                })
                .collect(),
        }
    }

    fn image(manifest: ImageManifest, config: ImageConfig) -> Self {
        let size = manifest.total_size();
        let configuration = config
            .config
            .map(|runtime| ImageConfiguration {
                environment: runtime.env,
                entrypoint: runtime.entrypoint,
                command: runtime.cmd,
                working_directory: runtime.working_dir,
            })
            .unwrap_or_default();

        ManifestView::Image {
            metadata: ImageMetadata {
                created: config.created,
                author: config.author,
                size,
                annotations: manifest.annotations,
            },
            configuration,
            layers: manifest
                .layers
                .into_iter()
                .map(|layer| LayerView {
                    media_type: layer.media_type,
                    digest: layer.digest,
                    size: layer.size,
                })
                .collect(),
        }
    }
}

impl Registry {
    /// Names of all repositories, sorted.
    pub async fn repository_names(&self) -> RegistryResult<RepositoryList> {
        let listing = self.repositories().await?;
        Ok(RepositoryList {
            repositories: listing.names().map(str::to_owned).collect(),
        })
    }

    /// Revisions and tags of repository `name`.
    pub async fn repository_view(&self, name: &str) -> RegistryResult<RepositoryView> {
        let (_, index) = self.repository_index(name).await?;
        let revisions = index
            .iter()
            .map(|revision| {
                let tags = revision.tag_names().map(str::to_owned).collect();
                (revision.digest.to_string(), RevisionView { tags })
            })
            .collect();
        Ok(RepositoryView { revisions })
    }

    /// Summary of revision `revision` of repository `name`.
    ///
    /// For an image manifest this also reads the image config.
    pub async fn describe(&self, name: &str, revision: &str) -> RegistryResult<ManifestView> {
        let digest: Digest = revision
            .parse()
            .map_err(RegistryError::invalid_digest(revision))?;

        match self.manifest(name, &digest).await? {
            Manifest::Index(index) => Ok(ManifestView::index(&index)),
            Manifest::Image(manifest) => {
                let config = self.image_config(&manifest).await?;
                Ok(ManifestView::image(manifest, config))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::oci::media_types;
    use crate::testing::Store;

    #[tokio::test]
    async fn repository_view_lists_tags() {
        let store = Store::new();
        let a = Store::digest_of(b"a");
        let b = Store::digest_of(b"b");
        store.add_revision("library/alpine", &a);
        store.add_revision("library/alpine", &b);
        store.add_tag("library/alpine", "3.20", &b.to_string());
        store.add_tag("library/alpine", "latest", &b.to_string());

        let registry = Registry::new(store.config());
        let view = registry.repository_view("library/alpine").await.unwrap();

        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "revisions": {
                    a.to_string(): {"tags": []},
                    b.to_string(): {"tags": ["3.20", "latest"]}
                }
            })
        );
    }

    #[tokio::test]
    async fn describe_rejects_bad_digest() {
        let store = Store::new();
        store.add_repository("app");

        let registry = Registry::new(store.config());
        let err = registry.describe("app", "sha256:ABC").await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDigest { ref input, .. } if input == "sha256:ABC"));
    }

    #[tokio::test]
    async fn image_without_runtime_config() {
        let store = Store::new();
        let config = store.put_json(&json!({
            "architecture": "arm64",
            "os": "linux",
            "rootfs": {"type": "layers", "diff_ids": []}
        }));
        let manifest = store.put_json(&json!({
            "schemaVersion": 2,
            "mediaType": media_types::IMAGE_MANIFEST,
            "config": {"mediaType": media_types::IMAGE_CONFIG, "digest": config, "size": 12},
            "layers": []
        }));
        store.add_revision("app", &manifest);

        let registry = Registry::new(store.config());
        let view = registry.describe("app", &manifest.to_string()).await.unwrap();

        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "type": "image",
                "metadata": {"created": null, "author": null, "size": 12, "annotations": {}},
                "configuration": {
                    "environment": null,
                    "entrypoint": null,
                    "command": null,
                    "working_directory": null
                },
                "layers": []
            })
        );
    }

    #[tokio::test]
    async fn layer_digests_are_shown_as_written() {
        let store = Store::new();
        let config = store.put_json(&json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": {"type": "layers", "diff_ids": ["sha1:da39a3ee5e6b4b0d3255bfef95601890afd80709"]}
        }));
        let manifest = store.put_json(&json!({
            "schemaVersion": 2,
            "mediaType": media_types::IMAGE_MANIFEST,
            "config": {"mediaType": media_types::IMAGE_CONFIG, "digest": config, "size": 10},
            "layers": [{
                "mediaType": media_types::LAYER_TAR_GZIP,
                "digest": "sha1:da39a3ee5e6b4b0d3255bfef95601890afd80709",
                "size": 5
            }]
        }));
        store.add_revision("app", &manifest);

        let registry = Registry::new(store.config());
        let view = registry.describe("app", &manifest.to_string()).await.unwrap();
        let ManifestView::Image { layers, metadata, .. } = view else {
            panic!("expected an image view");
        };
        assert_eq!(metadata.size, 15);
        assert_eq!(layers[0].digest, "sha1:da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[tokio::test]
    async fn index_entry_without_platform() {
        let store = Store::new();
        let index = store.put_json(&json!({
            "schemaVersion": 2,
            "mediaType": media_types::IMAGE_INDEX,
            "manifests": [{
                "mediaType": media_types::IMAGE_MANIFEST,
                "digest": Store::digest_of(b"attestation"),
                "size": 10,
                "annotations": {"vnd.docker.reference.type": "attestation-manifest"}
            }]
        }));
        store.add_revision("app", &index);

        let registry = Registry::new(store.config());
        let view = registry.describe("app", &index.to_string()).await.unwrap();
        let ManifestView::Index { manifests } = view else {
            panic!("expected an index view");
        };
        assert_eq!(manifests.len(), 1);
        assert!(manifests[0].platform.is_none());
    }
}
