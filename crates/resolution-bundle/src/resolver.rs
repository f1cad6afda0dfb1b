//! The bundle resolver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resolution_config::KEY_FETCH_TIMEOUT;
use resolution_framework::{Params, Resolver, ResolverContext, ResolverError, type_selector};
use resolution_types::{LABEL_KEY_RESOLVER_TYPE, ResolvedResource, Resource};

use crate::keychain::{Anonymous, Keychain, ServiceAccountKeychain};
use crate::layer::{
    BUNDLE_ANNOTATION_API_VERSION, BUNDLE_ANNOTATION_KIND, BUNDLE_ANNOTATION_NAME, LayerContent,
    MAX_LAYER_BYTES, extract, select_layer,
};
use crate::params::BundleParams;
use crate::registry::{HttpRegistryClient, RegistryClient};

/// Value of the resolver-type label routed to this resolver.
pub const LABEL_VALUE_BUNDLE_RESOLVER_TYPE: &str = "bundle";

/// Name the resolver registers under.
pub const BUNDLE_RESOLVER_NAME: &str = "bundleresolver";

/// Where pull credentials come from.
#[derive(Clone)]
enum CredentialSource {
    Fixed(Arc<dyn Keychain>),
    ServiceAccount(kube::Client),
}

/// Fetches one object out of a Tekton OCI bundle.
#[derive(Clone)]
pub struct BundleResolver {
    registry: Arc<dyn RegistryClient>,
    credentials: CredentialSource,
}

impl Default for BundleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleResolver {
    /// Resolver pulling anonymously over HTTP.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HttpRegistryClient::new()),
            credentials: CredentialSource::Fixed(Arc::new(Anonymous)),
        }
    }

    /// Authenticate with the pull secrets of the request's service account.
    pub fn with_kube_client(mut self, client: kube::Client) -> Self {
        self.credentials = CredentialSource::ServiceAccount(client);
        self
    }

    /// Authenticate from a fixed keychain.
    pub fn with_keychain(mut self, keychain: Arc<dyn Keychain>) -> Self {
        self.credentials = CredentialSource::Fixed(keychain);
        self
    }

    /// Use a custom registry transport.
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = registry;
        self
    }

    fn keychain(&self, ctx: &ResolverContext, service_account: &str) -> Arc<dyn Keychain> {
        match &self.credentials {
            CredentialSource::Fixed(keychain) => keychain.clone(),
            CredentialSource::ServiceAccount(client) => Arc::new(ServiceAccountKeychain::new(
                client.clone(),
                ctx.namespace().unwrap_or("default"),
                service_account,
            )),
        }
    }
}

#[async_trait]
impl Resolver for BundleResolver {
    fn name(&self) -> &str {
        BUNDLE_RESOLVER_NAME
    }

    fn selector(&self) -> Params {
        type_selector(LABEL_KEY_RESOLVER_TYPE, LABEL_VALUE_BUNDLE_RESOLVER_TYPE)
    }

    fn validate_params(&self, ctx: &ResolverContext, params: &Params) -> Result<(), ResolverError> {
        BundleParams::from_params(params, ctx.config()).map(|_| ())
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        params: &Params,
    ) -> Result<Box<dyn ResolvedResource>, ResolverError> {
        let params = BundleParams::from_params(params, ctx.config())?;
        let image = &params.bundle;

        let keychain = self.keychain(ctx, &params.service_account);
        let credentials = keychain.credentials(&image.registry).await?;
        let manifest = self.registry.manifest(image, credentials.as_ref()).await?;
        let layer = select_layer(&manifest, &params.kind, &params.name)?;
        let blob = self
            .registry
            .blob(image, &layer.descriptor.digest, credentials.as_ref())
            .await?;

        tracing::debug!(
            image = %image,
            layer = layer.index,
            digest = %layer.descriptor.digest,
            "bundle layer fetched"
        );
        let resource = match extract(&blob, MAX_LAYER_BYTES)? {
            LayerContent::Entry(data) => Resource::new(data)
                .with_annotation(BUNDLE_ANNOTATION_KIND, layer.kind)
                .with_annotation(BUNDLE_ANNOTATION_NAME, layer.name)
                .with_annotation(BUNDLE_ANNOTATION_API_VERSION, layer.api_version),
            LayerContent::Raw(data) => Resource::new(data),
        };
        Ok(Box::new(resource))
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
