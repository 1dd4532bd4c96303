//! Resolving manifests and configs out of the blob store

use crate::digest::Digest;
use crate::error::{InternalError, InternalKind, RegistryError, RegistryResult};
use crate::oci::{ImageConfig, ImageManifest, Manifest, SchemaError};
use crate::registry::Registry;

impl Registry {
    /// The manifest or index stored as revision `digest` of repository `name`.
    ///
    /// Only blobs which are revisions of the named repository can be read
    /// this way; any other digest is [`RevisionNotFound`], even when the
    /// blob exists in the store.
    ///
    /// [`RevisionNotFound`]: crate::RegistryError::RevisionNotFound
    #[tracing::instrument(skip(self), fields(%digest))]
    pub async fn manifest(&self, name: &str, digest: &Digest) -> RegistryResult<Manifest> {
        let (_, index) = self.repository_index(name).await?;
        let revision = index
            .get(digest)
            .ok_or_else(|| RegistryError::RevisionNotFound(digest.clone()))?;

        let blob = self.blobs().blob(&revision.digest).await?;
        Manifest::from_slice(blob.content()).map_err(|err| {
            tracing::error!(repository = %name, %digest, error = %err, "Stored manifest is invalid");
            internal(&err).into()
        })
    }

    /// The image config stored as blob `digest`.
    ///
    /// No access check is made: `digest` should come from the `config`
    /// descriptor of a manifest obtained through [`Registry::manifest`].
    #[tracing::instrument(skip(self), fields(%digest))]
    pub async fn config(&self, digest: &Digest) -> RegistryResult<ImageConfig> {
        let blob = self.blobs().blob(digest).await?;
        ImageConfig::from_slice(blob.content()).map_err(|err| {
            tracing::error!(%digest, error = %err, "Stored image config is invalid");
            internal(&err).into()
        })
    }

    /// The image config referenced by `manifest`.
    ///
    /// A config descriptor whose digest the store cannot address is an
    /// internal error, like any other defect of the stored manifest.
    pub async fn image_config(&self, manifest: &ImageManifest) -> RegistryResult<ImageConfig> {
        let digest = manifest.config.parse_digest().map_err(|err| {
            tracing::error!(digest = %manifest.config.digest, error = %err, "Config descriptor has an invalid digest");
            InternalError::new(InternalKind::Digest)
        })?;
        self.config(&digest).await
    }
}

fn internal(err: &SchemaError) -> InternalError {
    let kind = match err {
        SchemaError::UnknownMediaType(_) => InternalKind::MediaType,
        err if err.is_syntax() => InternalKind::Json,
        _ => InternalKind::Schema,
    };
    InternalError::new(kind)
}
