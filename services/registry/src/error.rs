//! Error types for the registry explorer

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::digest::{Digest, DigestError};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
///
/// Failures caused by the identifiers a caller supplied are reported
/// precisely. Failures caused by the contents of the store itself are
/// logged where they happen and reported only as an [`InternalError`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Invalid digest format
    #[error("invalid digest {input:?}: {source}")]
    InvalidDigest {
        /// The rejected digest text
        input: String,
        /// Why it was rejected
        source: DigestError,
    },

    /// Repository not found
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Revision not found in the repository
    #[error("revision not found: {0}")]
    RevisionNotFound(Digest),

    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(Digest),

    /// The store holds something we cannot read or understand
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl RegistryError {
    /// Returns a closure turning a [`DigestError`] for `input` into a registry error.
    pub fn invalid_digest(input: &str) -> impl FnOnce(DigestError) -> RegistryError {
        let input = input.to_owned();
        move |source| RegistryError::InvalidDigest { input, source }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::InvalidDigest { .. } => StatusCode::BAD_REQUEST,
            RegistryError::RepositoryNotFound(_)
            | RegistryError::RevisionNotFound(_)
            | RegistryError::BlobNotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::InvalidDigest { .. } => "DIGEST_INVALID",
            RegistryError::RepositoryNotFound(_) => "NAME_UNKNOWN",
            RegistryError::RevisionNotFound(_) => "MANIFEST_UNKNOWN",
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::Internal(_) => "UNKNOWN",
        }
    }

    /// The internal error, if this is one.
    pub fn as_internal(&self) -> Option<&InternalError> {
        match self {
            RegistryError::Internal(internal) => Some(internal),
            _ => None,
        }
    }
}

/// Category of an internal failure.
///
/// This is all that leaves the crate about a failure of the store: the
/// cause (paths, OS errors, parser messages) is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalKind {
    /// Reading from the store failed
    Io,

    /// A stored document is not valid JSON
    Json,

    /// A stored document does not match its schema
    Schema,

    /// A stored manifest declares a media type we do not serve
    MediaType,

    /// A digest uses an algorithm the store layout cannot address
    Digest,

    /// A blocking filesystem task did not complete
    Task,
}

impl fmt::Display for InternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalKind::Io => write!(f, "storage"),
            InternalKind::Json => write!(f, "JSON blob"),
            InternalKind::Schema => write!(f, "document schema"),
            InternalKind::MediaType => write!(f, "media type"),
            InternalKind::Digest => write!(f, "digest algorithm"),
            InternalKind::Task => write!(f, "background task"),
        }
    }
}

/// An opaque internal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("internal error ({kind})")]
pub struct InternalError {
    kind: InternalKind,
}

impl InternalError {
    /// Create an internal error of the given kind.
    pub fn new(kind: InternalKind) -> Self {
        Self { kind }
    }

    /// The category of failure.
    pub fn kind(&self) -> InternalKind {
        self.kind
    }
}

impl From<InternalKind> for InternalError {
    fn from(kind: InternalKind) -> Self {
        InternalError::new(kind)
    }
}

/// Error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_opaque() {
        let err = RegistryError::from(InternalError::new(InternalKind::Schema));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "UNKNOWN");
        assert_eq!(err.to_string(), "internal error (document schema)");
    }

    #[test]
    fn caller_errors_are_precise() {
        let err = "sha256:abc"
            .parse::<Digest>()
            .map_err(RegistryError::invalid_digest("sha256:abc"))
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("sha256:abc"));
        assert!(err.as_internal().is_none());

        let err = RegistryError::RepositoryNotFound("library/missing".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NAME_UNKNOWN");
    }
}
