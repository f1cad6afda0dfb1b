//! Bundle transport errors.

use resolution_framework::ResolverError;
use thiserror::Error;

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Errors raised while pulling an entry out of an OCI bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The bundle parameter is not a valid image reference.
    #[error("invalid bundle reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// The request could not be sent or the body could not be read.
    #[error("error retrieving image: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("registry returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Token negotiation with the registry failed.
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// The manifest could not be decoded or is of an unsupported type.
    #[error("error parsing bundle manifest: {0}")]
    Manifest(String),

    /// A layer lacks one of the annotations used to locate entries.
    #[error("{annotation} annotation not found in bundle layer {layer}")]
    MissingAnnotation { annotation: &'static str, layer: usize },

    /// No layer carries the requested kind and name.
    #[error("no matching image layer for {kind} '{name}'")]
    NoMatchingLayer { kind: String, name: String },

    /// A blob's content does not hash to its digest.
    #[error("layer digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },

    /// The layer could not be decompressed or unpacked.
    #[error("invalid layer: {0}")]
    Layer(#[from] std::io::Error),

    /// The layer's tar archive has no entries.
    #[error("error reading tarball header: archive is empty")]
    EmptyArchive,

    /// The tar entry is shorter or longer than its header claims.
    #[error("layer data does not match size reported in header: expected {expected} received {received}")]
    SizeMismatch { expected: u64, received: u64 },

    /// The layer unpacks to more than the resolver accepts.
    #[error("layer exceeds the {limit} byte limit once decompressed")]
    TooLarge { limit: u64 },

    /// Pull credentials could not be looked up.
    #[error("error reading pull credentials: {0}")]
    Credentials(String),

    /// The cluster API rejected a credential lookup.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl BundleError {
    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a credentials error.
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Whether the registry refused our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Auth(_)) || matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

impl From<BundleError> for ResolverError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::InvalidReference { .. } => ResolverError::invalid_params(err.to_string()),
            BundleError::Manifest(_) => ResolverError::parse(err.to_string()),
            _ => ResolverError::fetch(err.to_string()),
        }
    }
}
