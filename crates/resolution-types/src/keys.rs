//! Reserved label, annotation and reason keys shared by requesters and
//! resolvers.

/// Label every record carries to name the resolver type that should claim it.
pub const LABEL_KEY_RESOLVER_TYPE: &str = "resolution.tekton.dev/type";

/// Label marking which component manages a record.
pub const LABEL_KEY_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Annotation carrying the content type of the resolved payload.
pub const ANNOTATION_KEY_CONTENT_TYPE: &str = "content-type";

/// API group/version of the record kind.
pub const API_VERSION: &str = "resolution.tekton.dev/v1alpha1";

/// Kind of the record.
pub const KIND: &str = "ResourceRequest";

/// Reason used while a record waits for its resolver.
pub const REASON_RESOLUTION_IN_PROGRESS: &str = "ResolutionInProgress";

/// Reason used when a resolver reports a failure.
pub const REASON_RESOLUTION_FAILED: &str = "ResolutionFailed";

/// Reason used when a record exceeds its resolution budget.
pub const REASON_RESOLUTION_TIMED_OUT: &str = "ResolutionTimedOut";

/// Reason used when a record's parameters are rejected.
pub const REASON_INVALID_REQUEST: &str = "InvalidRequest";

/// Message attached to records that no resolver has finished yet.
pub const MESSAGE_WAITING_FOR_RESOLVER: &str = "waiting for resolver";

/// Annotation prefix owned by the framework. Resolver-supplied annotations
/// under this prefix are overwritten.
pub const RESERVED_ANNOTATION_PREFIX: &str = "resolution.tekton.dev/";

/// Annotation naming the resolver that wrote the payload.
pub const ANNOTATION_KEY_RESOLVED_BY: &str = "resolution.tekton.dev/resolved-by";
