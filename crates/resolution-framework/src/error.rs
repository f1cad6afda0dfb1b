//! Error types for resolvers, record stores and controller startup.

use std::time::Duration;

use resolution_config::{ConfigError, format_duration};
use resolution_types::{
    ObjectKey, REASON_INVALID_REQUEST, REASON_RESOLUTION_FAILED, REASON_RESOLUTION_TIMED_OUT,
};
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Resolver errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors a resolver reports for a single record.
///
/// Every variant except [`ResolverError::Initialize`] ends up as the reason
/// and message of a failed record.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// Parameters are missing, malformed or conflicting.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The backend could not fetch the resource.
    #[error("{0}")]
    Fetch(String),

    /// The backend fetched something it could not interpret.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The fetch did not finish before its deadline.
    #[error("resolution took longer than {}", format_duration(*.0))]
    TimedOut(Duration),

    /// One-time setup failed.
    #[error("initialization failed: {0}")]
    Initialize(String),
}

impl ResolverError {
    /// Create an invalid parameters error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create a fetch error.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an initialization error.
    pub fn initialize(msg: impl Into<String>) -> Self {
        Self::Initialize(msg.into())
    }

    /// Whether the error came from parameter validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidParams(_))
    }

    /// Whether the error is a deadline hit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Condition reason recorded for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => REASON_INVALID_REQUEST,
            Self::TimedOut(_) => REASON_RESOLUTION_TIMED_OUT,
            _ => REASON_RESOLUTION_FAILED,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the key.
    #[error("record {0} not found")]
    NotFound(ObjectKey),

    /// A record already exists under the key.
    #[error("record {0} already exists")]
    AlreadyExists(ObjectKey),

    /// The write carried a stale resource version.
    #[error("record {key} was modified concurrently")]
    Conflict { key: ObjectKey },

    /// The record cannot be addressed.
    #[error(transparent)]
    InvalidRecord(#[from] resolution_types::Error),

    /// The record could not be encoded for the API server.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The cluster API rejected the call.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The watch stream failed.
    #[error("watch failed: {0}")]
    Watch(String),
}

impl StoreError {
    /// Whether the error is an optimistic-concurrency mismatch.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Startup errors
// ─────────────────────────────────────────────────────────────────────────────

/// Fatal errors raised while wiring a resolver into the framework.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The selector lacks the resolver-type label, or its value is empty.
    #[error("resolver '{resolver}' selector is missing a non-empty '{label}' label")]
    MissingTypeSelector { resolver: String, label: String },

    /// The resolver failed its one-time setup.
    #[error("resolver '{resolver}' failed to initialize: {source}")]
    Initialize {
        resolver: String,
        #[source]
        source: ResolverError,
    },

    /// The framework config is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The record store failed during startup.
    #[error(transparent)]
    Store(#[from] StoreError),
}
