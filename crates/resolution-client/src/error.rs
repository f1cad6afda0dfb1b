//! Requester error types.

use resolution_framework::StoreError;
use resolution_types::ObjectKey;
use thiserror::Error;

/// Result type alias for requester operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Why a submission did not yield a resource.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request is queued or being resolved. Submit again later.
    #[error("resource request {key} is still in progress")]
    InProgress { key: ObjectKey },

    /// The resolver reported a failure.
    #[error("resource request {key} failed ({reason}): {message}")]
    Failed {
        key: ObjectKey,
        reason: String,
        message: String,
    },

    /// The stored payload is not valid base64.
    #[error("error decoding data of {key} from base64: {source}")]
    Decode {
        key: ObjectKey,
        #[source]
        source: base64::DecodeError,
    },

    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RequestError {
    /// Whether submitting the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InProgress { .. } => true,
            Self::Store(e) => !matches!(e, StoreError::InvalidRecord(_)),
            Self::Failed { .. } | Self::Decode { .. } => false,
        }
    }

    /// Whether the request is merely still in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let key = ObjectKey::new("default", "rr");
        assert!(RequestError::InProgress { key: key.clone() }.is_retryable());
        assert!(
            !RequestError::Failed {
                key: key.clone(),
                reason: "ResolutionFailed".into(),
                message: "boom".into(),
            }
            .is_retryable()
        );
        assert!(RequestError::Store(StoreError::Watch("reset".into())).is_retryable());
        assert!(
            !RequestError::Store(StoreError::InvalidRecord(
                resolution_types::Error::MissingField(".metadata.name")
            ))
            .is_retryable()
        );
    }

    #[test]
    fn test_failed_message_carries_reason() {
        let err = RequestError::Failed {
            key: ObjectKey::new("ci", "fetch"),
            reason: "ResolutionTimedOut".into(),
            message: "too slow".into(),
        };
        assert_eq!(
            err.to_string(),
            "resource request ci/fetch failed (ResolutionTimedOut): too slow"
        );
    }
}
