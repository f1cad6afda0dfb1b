//! Parameter and config keys of the bundle resolver.

use resolution_config::ResolverConfig;
use resolution_framework::{Params, ResolverError, optional};

use crate::reference::ImageReference;

/// Image reference of the bundle.
pub const PARAM_BUNDLE: &str = "bundle";
/// Name of the object within the bundle.
pub const PARAM_NAME: &str = "name";
/// Kind of the object within the bundle.
pub const PARAM_KIND: &str = "kind";
/// Service account whose pull secrets authenticate the pull.
pub const PARAM_SERVICE_ACCOUNT: &str = "serviceAccount";

/// Config key supplying the service account when the request has none.
pub const CONFIG_SERVICE_ACCOUNT: &str = "default-service-account";
/// Config key supplying the kind when the request has none.
pub const CONFIG_KIND: &str = "default-kind";

/// A validated bundle lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleParams {
    pub bundle: ImageReference,
    pub name: String,
    pub kind: String,
    pub service_account: String,
}

impl BundleParams {
    /// Merge `params` over `config` and validate the result.
    pub fn from_params(params: &Params, config: &ResolverConfig) -> Result<Self, ResolverError> {
        let required = |value: Option<&str>, key: &str| {
            value
                .map(str::to_string)
                .ok_or_else(|| ResolverError::invalid_params(format!("parameter \"{key}\" required")))
        };

        let service_account = required(
            optional(params, PARAM_SERVICE_ACCOUNT).or_else(|| config.get(CONFIG_SERVICE_ACCOUNT)),
            PARAM_SERVICE_ACCOUNT,
        )?;
        let bundle = required(optional(params, PARAM_BUNDLE), PARAM_BUNDLE)?;
        let bundle = ImageReference::parse(&bundle)?;
        let name = required(optional(params, PARAM_NAME), PARAM_NAME)?;
        let kind = required(
            optional(params, PARAM_KIND).or_else(|| config.get(CONFIG_KIND)),
            PARAM_KIND,
        )?;

        Ok(Self {
            bundle,
            name,
            kind,
            service_account,
        })
    }
}
