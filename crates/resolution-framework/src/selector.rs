//! Label-equality routing of records to resolvers.

use std::collections::BTreeMap;

use crate::error::FrameworkError;

/// Prefix of every resolver's work queue name.
pub const QUEUE_NAME_PREFIX: &str = "TektonResolverFramework.";

/// Reject a selector that does not carry a non-empty `type_label`.
pub fn validate_selector(
    resolver: &str,
    selector: &BTreeMap<String, String>,
    type_label: &str,
) -> Result<(), FrameworkError> {
    match selector.get(type_label) {
        Some(value) if !value.is_empty() => Ok(()),
        _ => Err(FrameworkError::MissingTypeSelector {
            resolver: resolver.to_string(),
            label: type_label.to_string(),
        }),
    }
}

/// Whether a record with `labels` is claimed by `selector`.
///
/// Every selector pair must be present and equal. A missing or empty label
/// map never matches.
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(labels) = labels else {
        return false;
    };
    if labels.is_empty() {
        return false;
    }
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Render a selector as a Kubernetes label selector, `k1=v1,k2=v2`.
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Strip characters that are not allowed in infrastructure identifiers.
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| *c != '/' && *c != ' ').collect()
}

/// Work queue name for a resolver.
pub fn queue_name(resolver: &str) -> String {
    format!("{QUEUE_NAME_PREFIX}{}", sanitize_name(resolver))
}
