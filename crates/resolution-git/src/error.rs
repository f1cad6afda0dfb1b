//! Git transport errors.

use resolution_framework::ResolverError;
use thiserror::Error;

/// Result type alias for git transport operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// Errors raised while cloning and reading from a repository.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository could not be cloned.
    #[error("clone error: {0}")]
    Clone(#[source] git2::Error),

    /// HEAD could not be read after cloning.
    #[error("error reading repository HEAD value: {0}")]
    Head(#[source] git2::Error),

    /// The requested revision does not exist.
    #[error("checkout error: revision '{rev}': {source}")]
    Revision {
        rev: String,
        #[source]
        source: git2::Error,
    },

    /// The path does not exist at the resolved commit.
    #[error("error opening file '{path}': {source}")]
    FileNotFound {
        path: String,
        #[source]
        source: git2::Error,
    },

    /// The path names a directory or submodule.
    #[error("'{0}' is not a regular file")]
    NotAFile(String),

    /// Scratch space for the clone could not be created.
    #[error("failed to prepare clone directory: {0}")]
    Io(#[from] std::io::Error),

    /// The caller gave up on the fetch while the clone was running.
    #[error("clone cancelled")]
    Cancelled,

    /// The blocking clone task died.
    #[error("clone task failed: {0}")]
    Task(String),
}

impl From<GitError> for ResolverError {
    fn from(err: GitError) -> Self {
        ResolverError::fetch(err.to_string())
    }
}
