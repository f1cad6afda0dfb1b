//! What a caller asks for, and how that maps onto a record identity.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use sha2::{Digest, Sha256};

/// A resource request as seen by the requester.
pub trait Request: Send + Sync {
    /// Record name. Must be stable across retries of the same request.
    fn name(&self) -> &str;

    /// Record namespace.
    fn namespace(&self) -> &str;

    /// Parameters for the resolver.
    fn params(&self) -> &BTreeMap<String, String>;

    /// Object that should own the record, if any.
    fn owner_ref(&self) -> Option<OwnerReference> {
        None
    }
}

/// Plain [`Request`] holding its fields directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicRequest {
    name: String,
    namespace: String,
    params: BTreeMap<String, String>,
    owner: Option<OwnerReference>,
}

impl BasicRequest {
    /// Create a request.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            params,
            owner: None,
        }
    }

    /// Attach an owner to the record this request creates.
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }
}

impl Request for BasicRequest {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    fn owner_ref(&self) -> Option<OwnerReference> {
        self.owner.clone()
    }
}

/// Derive a stable record name from a request identity.
///
/// The same `base` and parameters always produce the same name, so a caller
/// that retries a submission lands on the record it created earlier.
pub fn deterministic_name(prefix: &str, base: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
    format!("{prefix}-{}", hex::encode(hasher.finalize()))
}

/// Two owner references name the same owner when apiVersion, kind, name,
/// uid and controller flag all agree.
pub fn owner_refs_equal(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.api_version == b.api_version
        && a.kind == b.kind
        && a.name == b.name
        && a.uid == b.uid
        && a.controller == b.controller
}

/// Add `owner` to `meta` unless an equal reference is already there.
/// Returns whether the list changed.
pub fn append_owner_reference(meta: &mut ObjectMeta, owner: OwnerReference) -> bool {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if refs.iter().any(|existing| owner_refs_equal(existing, &owner)) {
        return false;
    }
    refs.push(owner);
    true
}
