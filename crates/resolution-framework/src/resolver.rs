//! The capability contract every resolver backend implements.
//!
//! A resolver is a value bound to the dispatch runtime at process wiring
//! time. The framework calls [`Resolver::initialize`] once, routes records
//! whose labels match [`Resolver::selector`], and for each unresolved record
//! runs [`Resolver::validate_params`] followed by [`Resolver::resolve`] under
//! a deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl Resolver for Echo {
//!     fn name(&self) -> &str { "Echo" }
//!     fn selector(&self) -> Params { type_selector(LABEL_KEY_RESOLVER_TYPE, "echo") }
//!     fn validate_params(&self, _: &ResolverContext, p: &Params) -> Result<(), ResolverError> {
//!         require(p, "value").map(|_| ())
//!     }
//!     async fn resolve(&self, _: &ResolverContext, p: &Params)
//!         -> Result<Box<dyn ResolvedResource>, ResolverError> {
//!         Ok(Box::new(Resource::new(p["value"].clone())))
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use resolution_config::ResolverConfig;
use resolution_types::ResolvedResource;

use crate::error::ResolverError;

/// Request parameters and selectors share this ordered map shape.
pub type Params = BTreeMap<String, String>;

/// Per-reconciliation context handed to every resolver call.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    config: ResolverConfig,
    namespace: Option<String>,
}

impl ResolverContext {
    /// Create a context over a config snapshot.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            namespace: None,
        }
    }

    /// Set the namespace of the record being resolved.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The resolver's configuration as of the start of this reconciliation.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Namespace of the record being resolved, when known.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// A backend that fetches one kind of remote resource.
///
/// Calls for different records may run concurrently; the framework never
/// runs two calls for the same record at once.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// One-time setup before the dispatch loop starts. A failure aborts
    /// startup.
    async fn initialize(&mut self) -> Result<(), ResolverError> {
        Ok(())
    }

    /// Human-readable identifier, used for logging and queue naming.
    fn name(&self) -> &str;

    /// Labels a record must carry, by equality on every key, to be claimed.
    fn selector(&self) -> Params;

    /// Check parameters without side effects. The error names the offending
    /// parameter(s).
    fn validate_params(&self, ctx: &ResolverContext, params: &Params)
    -> Result<(), ResolverError>;

    /// Fetch the resource. The framework cancels the future when the
    /// deadline passes.
    async fn resolve(
        &self,
        ctx: &ResolverContext,
        params: &Params,
    ) -> Result<Box<dyn ResolvedResource>, ResolverError>;

    /// Resolution budget for this backend. Defaults to the process-wide
    /// timeout.
    fn resolution_timeout(&self, _ctx: &ResolverContext, default: Duration) -> Duration {
        default
    }
}

/// Build a selector holding only the resolver-type label.
pub fn type_selector(label: &str, resolver_type: &str) -> Params {
    BTreeMap::from([(label.to_string(), resolver_type.to_string())])
}

/// Look up a required, non-empty parameter.
pub fn require<'a>(params: &'a Params, key: &str) -> Result<&'a str, ResolverError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ResolverError::invalid_params(format!("missing required parameter '{key}'")))
}

/// Look up an optional parameter, treating an empty value as unset.
pub fn optional<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}
