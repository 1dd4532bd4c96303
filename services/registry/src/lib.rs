//! # Registry explorer
//!
//! Read-only access to a [Docker Registry v2] storage tree on local disk:
//! repositories, their revisions and tags, and the OCI manifests, indexes
//! and image configs they point at.
//!
//! Repository listings and revision indexes are cached as immutable
//! snapshots which are rebuilt on demand once they are older than their
//! TTL. Blobs are read from disk on every access.
//!
//! Nothing is ever written to the store.
//!
//! ## Example
//!
//! ```no_run
//! use registry_explorer::{Registry, RegistryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new(RegistryConfig::new("/var/lib/registry"));
//!
//! for name in registry.repository_names().await?.repositories {
//!     println!("{name}");
//! }
//!
//! // Serve the explorer API with axum or any tower-compatible server
//! let app = registry_explorer::router(registry);
//! # Ok(())
//! # }
//! ```
//!
//! [Docker Registry v2]: https://distribution.github.io/distribution/

mod api;
mod blob;
mod config;
mod digest;
mod error;
mod layout;
pub mod oci;
mod registry;
mod repository;
mod resolve;
mod view;

#[cfg(test)]
mod testing;

pub use api::router;
pub use blob::{Blob, BlobStore};
pub use config::{ConfigError, DEFAULT_LOAD_TTL, RegistryConfig, Settings};
pub use digest::{Algorithm, Digest, DigestError};
pub use error::{InternalError, InternalKind, RegistryError, RegistryResult};
pub use layout::Layout;
pub use oci::{ImageConfig, ImageIndex, ImageManifest, Manifest, SchemaError};
pub use registry::{Registry, RepositoryListing};
pub use repository::{Repository, Revision, RevisionIndex, Tag};
pub use view::{
    ImageConfiguration, ImageMetadata, IndexEntry, LayerView, ManifestView, RepositoryList,
    RepositoryView, RevisionView,
};
