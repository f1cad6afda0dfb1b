//! The hub resolver.

use std::time::Duration;

use async_trait::async_trait;
use resolution_config::KEY_FETCH_TIMEOUT;
use resolution_framework::{Params, Resolver, ResolverContext, ResolverError, type_selector};
use resolution_types::{LABEL_KEY_RESOLVER_TYPE, ResolvedResource, Resource};
use serde::Deserialize;
use url::Url;

use crate::error::{self, HubError};
use crate::params::HubParams;

/// Value of the resolver-type label routed to this resolver.
pub const LABEL_VALUE_HUB_RESOLVER_TYPE: &str = "hub";

/// Name the resolver registers under.
pub const HUB_RESOLVER_NAME: &str = "Hub";

/// Public Tekton Hub API.
pub const DEFAULT_API_BASE: &str = "https://api.hub.tekton.dev";

const RESOURCE_PATH: &str = "v1/resource/{catalog}/{kind}/{name}/{version}/yaml";

#[derive(Debug, Deserialize)]
struct HubResponse {
    data: HubData,
}

#[derive(Debug, Deserialize)]
struct HubData {
    yaml: String,
}

/// Fetches task and pipeline definitions from a Tekton Hub catalog.
#[derive(Debug, Clone)]
pub struct HubResolver {
    http: reqwest::Client,
    url_template: String,
}

impl Default for HubResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HubResolver {
    /// Resolver against the public hub.
    pub fn new() -> Self {
        Self::with_url_template(format!("{DEFAULT_API_BASE}/{RESOURCE_PATH}"))
    }

    /// Resolver with a URL template holding `{catalog}`, `{kind}`, `{name}`
    /// and `{version}` placeholders.
    pub fn with_url_template(url_template: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url_template: url_template.into(),
        }
    }

    /// Resolver against a hub deployment rooted at `api_base`.
    pub fn from_api_base(api_base: &str) -> Self {
        Self::with_url_template(format!(
            "{}/{RESOURCE_PATH}",
            api_base.trim_end_matches('/')
        ))
    }

    /// The URL template lookups expand.
    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    /// Expand the template for one lookup. Values are percent-encoded, so
    /// none of them can add a path segment, a query or a fragment.
    pub fn resource_url(&self, params: &HubParams) -> error::Result<Url> {
        let url = self
            .url_template
            .replace("{catalog}", &urlencoding::encode(&params.catalog))
            .replace("{kind}", &urlencoding::encode(&params.kind))
            .replace("{name}", &urlencoding::encode(&params.name))
            .replace("{version}", &urlencoding::encode(&params.version));
        Ok(Url::parse(&url)?)
    }

    async fn fetch(&self, params: &HubParams) -> error::Result<String> {
        let url = self.resource_url(params)?;
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        let parsed: HubResponse = serde_json::from_slice(&body)?;
        Ok(parsed.data.yaml)
    }
}

#[async_trait]
impl Resolver for HubResolver {
    fn name(&self) -> &str {
        HUB_RESOLVER_NAME
    }

    fn selector(&self) -> Params {
        type_selector(LABEL_KEY_RESOLVER_TYPE, LABEL_VALUE_HUB_RESOLVER_TYPE)
    }

    fn validate_params(&self, ctx: &ResolverContext, params: &Params) -> Result<(), ResolverError> {
        HubParams::from_params(params, ctx.config()).map(|_| ())
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        params: &Params,
    ) -> Result<Box<dyn ResolvedResource>, ResolverError> {
        let params = HubParams::from_params(params, ctx.config())?;
        let yaml = self.fetch(&params).await?;
        tracing::debug!(
            catalog = %params.catalog,
            kind = %params.kind,
            name = %params.name,
            version = %params.version,
            "hub resource fetched"
        );
        Ok(Box::new(Resource::new(yaml)))
    }

    fn resolution_timeout(&self, ctx: &ResolverContext, default: Duration) -> Duration {
        match ctx.config().duration(KEY_FETCH_TIMEOUT) {
            Ok(Some(timeout)) => timeout,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring invalid {KEY_FETCH_TIMEOUT}");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> HubParams {
        HubParams {
            catalog: "Tekton".into(),
            kind: "task".into(),
            name: "git-clone".into(),
            version: "0.6".into(),
        }
    }

    #[test]
    fn test_default_url() {
        let url = HubResolver::new().resource_url(&lookup()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.hub.tekton.dev/v1/resource/Tekton/task/git-clone/0.6/yaml"
        );
    }

    #[test]
    fn test_values_cannot_escape_their_segment() {
        let params = HubParams {
            name: "git-clone#".into(),
            version: "0.6?raw=1".into(),
            ..lookup()
        };
        let url = HubResolver::new().resource_url(&params).unwrap();
        assert_eq!(
            url.path(),
            "/v1/resource/Tekton/task/git-clone%23/0.6%3Fraw%3D1/yaml"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let spaced = HubParams {
            catalog: "My Catalog".into(),
            ..lookup()
        };
        let url = HubResolver::new().resource_url(&spaced).unwrap();
        assert!(url.path().starts_with("/v1/resource/My%20Catalog/"));
    }

    #[test]
    fn test_from_api_base_trims_slash() {
        let resolver = HubResolver::from_api_base("http://hub.internal:8000/");
        assert_eq!(
            resolver.url_template(),
            "http://hub.internal:8000/v1/resource/{catalog}/{kind}/{name}/{version}/yaml"
        );
    }

    #[test]
    fn test_selector_and_name() {
        let resolver = HubResolver::new();
        assert_eq!(resolver.name(), "Hub");
        assert_eq!(resolver.selector()["resolution.tekton.dev/type"], "hub");
    }
}
