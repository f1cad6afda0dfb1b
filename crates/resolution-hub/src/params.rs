//! Parameter and config keys of the hub resolver.

use resolution_config::ResolverConfig;
use resolution_framework::{Params, ResolverError, optional};

/// Catalog to look the resource up in.
pub const PARAM_CATALOG: &str = "catalog";
/// Resource kind, `task` or `pipeline`.
pub const PARAM_KIND: &str = "kind";
/// Resource name within the catalog.
pub const PARAM_NAME: &str = "name";
/// Resource version.
pub const PARAM_VERSION: &str = "version";

/// Config key supplying the catalog when the request has none.
pub const CONFIG_CATALOG: &str = "default-catalog";
/// Config key supplying the kind when the request has none.
pub const CONFIG_KIND: &str = "default-kind";

/// Catalog used when neither request nor config names one.
pub const DEFAULT_CATALOG: &str = "Tekton";

/// Kinds the catalog serves.
pub const SUPPORTED_KINDS: [&str; 2] = ["task", "pipeline"];

/// A validated lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubParams {
    pub catalog: String,
    pub kind: String,
    pub name: String,
    pub version: String,
}

impl HubParams {
    /// Merge `params` over `config` and validate the result.
    pub fn from_params(params: &Params, config: &ResolverConfig) -> Result<Self, ResolverError> {
        let kind = optional(params, PARAM_KIND)
            .or_else(|| config.get(CONFIG_KIND))
            .ok_or_else(|| ResolverError::invalid_params("must include kind param"))?;
        if !SUPPORTED_KINDS.contains(&kind) {
            return Err(ResolverError::invalid_params(format!(
                "kind param must be task or pipeline, got '{kind}'"
            )));
        }
        let name = segment(params, PARAM_NAME)?;
        let version = segment(params, PARAM_VERSION)?;
        let catalog = optional(params, PARAM_CATALOG)
            .or_else(|| config.get(CONFIG_CATALOG))
            .unwrap_or(DEFAULT_CATALOG);
        if catalog.contains('/') {
            return Err(ResolverError::invalid_params(format!(
                "{PARAM_CATALOG} '{catalog}' must not contain '/'"
            )));
        }

        Ok(Self {
            catalog: catalog.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// A required value that is substituted into one URL path segment.
fn segment<'a>(params: &'a Params, key: &str) -> Result<&'a str, ResolverError> {
    let value = optional(params, key)
        .ok_or_else(|| ResolverError::invalid_params(format!("must include {key} param")))?;
    if value.contains('/') {
        return Err(ResolverError::invalid_params(format!(
            "{key} '{value}' must not contain '/'"
        )));
    }
    Ok(value)
}
