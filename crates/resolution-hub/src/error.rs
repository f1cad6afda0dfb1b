//! Hub transport errors.

use resolution_framework::ResolverError;
use thiserror::Error;

/// Result type alias for hub lookups.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors raised while querying the catalog API.
#[derive(Debug, Error)]
pub enum HubError {
    /// The request could not be sent or the body could not be read.
    #[error("error requesting resource from hub: {0}")]
    Http(#[from] reqwest::Error),

    /// The catalog answered with a non-success status.
    #[error("hub returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The expanded URL template is not a valid URL.
    #[error("invalid hub URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The body is not the expected JSON document.
    #[error("error unmarshalling json response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl HubError {
    /// Whether the catalog reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl From<HubError> for ResolverError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Parse(_) => ResolverError::parse(err.to_string()),
            _ => ResolverError::fetch(err.to_string()),
        }
    }
}
