//! OCI image documents
//!
//! Typed, validated forms of the [image manifest], [image index] and
//! [image config] documents held in the store.
//!
//! [image manifest]: https://github.com/opencontainers/image-spec/blob/main/manifest.md
//! [image index]: https://github.com/opencontainers/image-spec/blob/main/image-index.md
//! [image config]: https://github.com/opencontainers/image-spec/blob/main/config.md

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DigestError};

/// The only `schemaVersion` accepted for manifests and indexes.
pub const SCHEMA_VERSION: i64 = 2;

/// Media types for OCI documents and layers
pub mod media_types {
    /// Content descriptor
    pub const DESCRIPTOR: &str = "application/vnd.oci.descriptor.v1+json";
    /// OCI layout header
    pub const LAYOUT_HEADER: &str = "application/vnd.oci.layout.header.v1+json";
    /// Image index
    pub const IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    /// Image manifest
    pub const IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    /// Image config
    pub const IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    /// Uncompressed layer
    pub const LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
    /// Gzip compressed layer
    pub const LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    /// Zstd compressed layer
    pub const LAYER_TAR_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
    /// Empty JSON descriptor target
    pub const EMPTY: &str = "application/vnd.oci.empty.v1+json";
    /// in-toto attestation
    pub const IN_TOTO: &str = "application/vnd.in-toto+json";
}

/// Why a stored document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The document is not JSON, or its JSON does not fit the schema.
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported `schemaVersion`
    #[error("invalid schemaVersion={found} (must be 2)")]
    SchemaVersion {
        /// The declared version
        found: i64,
    },

    /// The `mediaType` does not match the document kind
    #[error("mediaType must be {expected}, found {found:?}")]
    MediaType {
        /// Media type of the document kind
        expected: &'static str,
        /// The declared media type
        found: String,
    },

    /// The manifest declares a media type that is neither index nor manifest
    #[error("unknown manifest mediaType {0:?}")]
    UnknownMediaType(Option<String>),
}

impl SchemaError {
    /// Whether the bytes were not JSON at all, as opposed to JSON which
    /// failed validation.
    pub fn is_syntax(&self) -> bool {
        matches!(self, SchemaError::Json(err) if !err.is_data())
    }
}

fn check_schema_version(found: i64) -> Result<(), SchemaError> {
    if found != SCHEMA_VERSION {
        return Err(SchemaError::SchemaVersion { found });
    }
    Ok(())
}

fn check_media_type(found: &str, expected: &'static str) -> Result<(), SchemaError> {
    if found != expected {
        return Err(SchemaError::MediaType {
            expected,
            found: found.to_owned(),
        });
    }
    Ok(())
}

/// Platform an image is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `amd64`
    pub architecture: String,

    /// Operating system, e.g. `linux`
    pub os: String,

    /// Operating system version
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Required operating system features
    #[serde(rename = "os.features", default, skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,

    /// CPU variant, e.g. `v8`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Reserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl Platform {
    /// Short `os-architecture` label.
    pub fn label(&self) -> String {
        format!("{}-{}", self.os, self.architecture)
    }
}

/// Reference to another blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: String,

    /// Digest of the referenced content, as written
    ///
    /// Kept as text so that descriptors using algorithms the store does not
    /// address (layers hosted elsewhere, foreign subjects) still parse. Use
    /// [`Descriptor::parse_digest`] before fetching the content.
    pub digest: String,

    /// Size of the referenced content in bytes
    pub size: u64,

    /// Platform, for entries of an index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Alternate download locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Embedded content, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Artifact type of the referenced manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Descriptor {
    /// The digest of the referenced content, validated.
    pub fn parse_digest(&self) -> Result<Digest, DigestError> {
        self.digest.parse()
    }
}

/// A single platform image: config plus layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Always 2
    pub schema_version: i64,

    /// Always [`media_types::IMAGE_MANIFEST`]
    pub media_type: String,

    /// Artifact type, for artifacts stored as images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The image config blob
    pub config: Descriptor,

    /// Layer blobs, base first
    pub layers: Vec<Descriptor>,

    /// Manifest this one refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ImageManifest {
    /// Check the schema version and media type.
    pub fn validate(self) -> Result<Self, SchemaError> {
        check_schema_version(self.schema_version)?;
        check_media_type(&self.media_type, media_types::IMAGE_MANIFEST)?;
        Ok(self)
    }

    /// Size of the config plus all layers, in bytes.
    pub fn total_size(&self) -> u64 {
        self.layers
            .iter()
            .fold(self.config.size, |total, layer| total.saturating_add(layer.size))
    }
}

/// A list of platform specific manifests for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Always 2
    pub schema_version: i64,

    /// Always [`media_types::IMAGE_INDEX`]
    pub media_type: String,

    /// The listed manifests
    #[serde(default)]
    pub manifests: Vec<Descriptor>,

    /// Artifact type, for artifacts stored as indexes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Manifest this one refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ImageIndex {
    /// Check the schema version and media type.
    pub fn validate(self) -> Result<Self, SchemaError> {
        check_schema_version(self.schema_version)?;
        check_media_type(&self.media_type, media_types::IMAGE_INDEX)?;
        Ok(self)
    }
}

/// A manifest blob, dispatched on its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// An image manifest
    Image(ImageManifest),

    /// An image index
    Index(ImageIndex),
}

impl Manifest {
    /// Parse and validate a manifest or index from JSON.
    pub fn from_slice(content: &[u8]) -> Result<Self, SchemaError> {
        let document: serde_json::Value = serde_json::from_slice(content)?;
        let media_type = document.get("mediaType").and_then(|value| value.as_str());

        match media_type {
            Some(media_types::IMAGE_INDEX) => {
                let index: ImageIndex = serde_json::from_value(document)?;
                Ok(Manifest::Index(index.validate()?))
            }
            Some(media_types::IMAGE_MANIFEST) => {
                let manifest: ImageManifest = serde_json::from_value(document)?;
                Ok(Manifest::Image(manifest.validate()?))
            }
            other => Err(SchemaError::UnknownMediaType(other.map(str::to_owned))),
        }
    }

    /// The declared media type.
    pub fn media_type(&self) -> &str {
        match self {
            Manifest::Image(manifest) => &manifest.media_type,
            Manifest::Index(index) => &index.media_type,
        }
    }
}

/// Runtime defaults for containers started from an image.
///
/// Field names follow the PascalCase used in the document. The deprecated
/// `ArgsEscaped` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuntimeConfig {
    /// User (and group) the process runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Ports to expose, keyed as `port/protocol`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,

    /// Environment, as `NAME=value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    /// Entrypoint argv
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,

    /// Default arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,

    /// Volume mount points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,

    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Arbitrary labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Signal sent to stop the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,

    /// Memory limit in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,

    /// Memory plus swap limit in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<i64>,

    /// Relative CPU weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,

    /// Container health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<serde_json::Value>,
}

/// Layer content identifiers of the root filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    /// Always `layers`
    #[serde(rename = "type")]
    pub kind: String,

    /// Digests of the uncompressed layers, base first
    pub diff_ids: Vec<String>,
}

/// One step of the image build history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// When the step ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Who ran it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// The command that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Free form comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Whether the step produced no layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_layer: Option<bool>,
}

/// The image config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// CPU architecture
    pub architecture: String,

    /// Operating system
    pub os: String,

    /// Root filesystem layers
    pub rootfs: RootFs,

    /// Operating system version
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Required operating system features
    #[serde(rename = "os.features", default, skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,

    /// CPU variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Creation time, RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Author of the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Runtime defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RuntimeConfig>,

    /// Build history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<History>,
}

impl ImageConfig {
    /// Parse and validate a config from JSON.
    pub fn from_slice(content: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(content)?)
    }
}
