//! Error types for the shared resolution types.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while handling records outside of any store.
#[derive(Debug, Error)]
pub enum Error {
    /// An object key string could not be parsed.
    #[error("invalid object key '{0}': expected <namespace>/<name>")]
    InvalidKey(String),

    /// A record is missing a metadata field it needs to be addressed.
    #[error("record is missing {0}")]
    MissingField(&'static str),

    /// Rendering the CRD manifest failed.
    #[error("failed to render manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
}
