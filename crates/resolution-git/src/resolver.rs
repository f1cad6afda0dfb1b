//! The git resolver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resolution_framework::{Params, Resolver, ResolverContext, ResolverError, type_selector};
use resolution_types::{
    ANNOTATION_KEY_CONTENT_TYPE, LABEL_KEY_RESOLVER_TYPE, ResolvedResource, Resource,
};

use crate::fetcher::{Git2Fetcher, GitFetcher};
use crate::params::{CONFIG_FETCH_TIMEOUT, GitParams};

/// Value of the resolver-type label routed to this resolver.
pub const LABEL_VALUE_GIT_RESOLVER_TYPE: &str = "git";

/// Name the resolver registers under.
pub const GIT_RESOLVER_NAME: &str = "Git";

/// Content type reported for fetched files.
pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// Annotation carrying the commit the file was read at.
pub const ANNOTATION_KEY_COMMIT_HASH: &str = "commit";

/// Fetches a single file from a git repository.
pub struct GitResolver {
    fetcher: Arc<dyn GitFetcher>,
}

impl Default for GitResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GitResolver {
    /// Resolver cloning with libgit2.
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(Git2Fetcher))
    }

    /// Resolver using a custom transport.
    pub fn with_fetcher(fetcher: Arc<dyn GitFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Resolver for GitResolver {
    fn name(&self) -> &str {
        GIT_RESOLVER_NAME
    }

    fn selector(&self) -> Params {
        type_selector(LABEL_KEY_RESOLVER_TYPE, LABEL_VALUE_GIT_RESOLVER_TYPE)
    }

    fn validate_params(&self, ctx: &ResolverContext, params: &Params) -> Result<(), ResolverError> {
        GitParams::from_params(params, ctx.config()).map(|_| ())
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        params: &Params,
    ) -> Result<Box<dyn ResolvedResource>, ResolverError> {
        let params = GitParams::from_params(params, ctx.config())?;
        let file = self.fetcher.fetch(&params).await?;
        tracing::debug!(url = %params.url, path = %params.path, commit = %file.commit, "file fetched");
        Ok(Box::new(
            Resource::new(file.content)
                .with_annotation(ANNOTATION_KEY_COMMIT_HASH, file.commit)
                .with_annotation(ANNOTATION_KEY_CONTENT_TYPE, YAML_CONTENT_TYPE),
        ))
    }

    fn resolution_timeout(&self, ctx: &ResolverContext, default: Duration) -> Duration {
        match ctx.config().duration(CONFIG_FETCH_TIMEOUT) {
            Ok(Some(timeout)) => timeout,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring invalid {CONFIG_FETCH_TIMEOUT}");
                default
            }
        }
    }
}
