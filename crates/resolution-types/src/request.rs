//! The `ResourceRequest` record.
//!
//! The record is the unit of coordination between a requester and a
//! resolver. Its spec is written once by the requester; only the owning
//! resolver writes its status.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{CONDITION_SUCCEEDED, Condition, ConditionStatus};
use crate::error::{Error, Result};
use crate::keys::{MESSAGE_WAITING_FOR_RESOLVER, REASON_RESOLUTION_IN_PROGRESS};

/// Parameters a requester supplies to the resolver.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "resolution.tekton.dev",
    version = "v1alpha1",
    kind = "ResourceRequest",
    namespaced,
    status = "ResourceRequestStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Succeeded","type":"string","jsonPath":".status.conditions[?(@.type=='Succeeded')].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type=='Succeeded')].reason"}"#
)]
pub struct ResourceRequestSpec {
    /// Resolver-specific parameters, immutable once created.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// Status written by the owning resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequestStatus {
    /// Holds the single `Succeeded` condition once a resolver has seen the record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Base64-encoded resolved payload, set only when `Succeeded` is `True`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,

    /// Backend-supplied metadata accompanying the payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ResourceRequestStatus {
    /// The `Succeeded` condition, if one has been set.
    pub fn succeeded(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.type_ == CONDITION_SUCCEEDED)
    }

    /// Whether a payload has been written.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Set the `Succeeded` condition to `Unknown` if it is absent.
    pub fn initialize_conditions(&mut self) {
        if self.succeeded().is_none() {
            self.set_succeeded(
                ConditionStatus::Unknown,
                Some(REASON_RESOLUTION_IN_PROGRESS.to_string()),
                Some(MESSAGE_WAITING_FOR_RESOLVER.to_string()),
            );
        }
    }

    /// Mark the record as resolved.
    pub fn mark_succeeded(&mut self) {
        self.set_succeeded(ConditionStatus::True, None, None);
    }

    /// Mark the record as failed.
    pub fn mark_failed(&mut self, reason: impl Into<String>, message: impl Into<String>) {
        self.set_succeeded(
            ConditionStatus::False,
            Some(reason.into()),
            Some(message.into()),
        );
    }

    /// Mark the record as still waiting on its resolver.
    pub fn mark_in_progress(&mut self, message: impl Into<String>) {
        self.set_succeeded(
            ConditionStatus::Unknown,
            Some(REASON_RESOLUTION_IN_PROGRESS.to_string()),
            Some(message.into()),
        );
    }

    fn set_succeeded(
        &mut self,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == CONDITION_SUCCEEDED)
        {
            Some(existing) => existing.transition(status, reason, message),
            None => {
                let mut cond = Condition::succeeded(status);
                cond.reason = reason;
                cond.message = message;
                self.conditions.push(cond);
            }
        }
    }
}

impl ResourceRequest {
    /// The `Succeeded` condition, if any.
    pub fn succeeded(&self) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.succeeded())
    }

    /// Whether the record reached a terminal state (`True` or `False`).
    pub fn is_done(&self) -> bool {
        self.succeeded().is_some_and(|c| !c.is_unknown())
    }

    /// Whether the record is unresolved: condition absent or `Unknown`.
    pub fn has_started(&self) -> bool {
        self.succeeded().is_none_or(|c| c.is_unknown())
    }

    /// Parameters supplied by the requester.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.spec.parameters
    }

    /// Labels on the record, `None` when the label map is absent.
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    /// When the store first persisted the record.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.creation_timestamp.as_ref().map(|t| t.0)
    }

    /// Resource version last observed for this record.
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Mutable status, created empty when missing.
    pub fn status_mut(&mut self) -> &mut ResourceRequestStatus {
        self.status.get_or_insert_with(ResourceRequestStatus::default)
    }

    /// Store key of the record.
    pub fn key(&self) -> Result<ObjectKey> {
        let namespace = self
            .metadata
            .namespace
            .clone()
            .ok_or(Error::MissingField(".metadata.namespace"))?;
        let name = self
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingField(".metadata.name"))?;
        Ok(ObjectKey { namespace, name })
    }

    /// Render the CRD manifest as YAML.
    pub fn crd_manifest() -> Result<String> {
        Ok(serde_yaml::to_string(&Self::crd())?)
    }
}

/// Identity of a record in the store: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{API_VERSION, KIND, REASON_RESOLUTION_FAILED};

    fn request() -> ResourceRequest {
        let mut rr = ResourceRequest::new(
            "fetch-pipeline",
            ResourceRequestSpec {
                parameters: BTreeMap::from([("url".to_string(), "r".to_string())]),
            },
        );
        rr.metadata.namespace = Some("default".into());
        rr
    }

    #[test]
    fn test_new_record_is_not_done() {
        let rr = request();
        assert!(!rr.is_done());
        assert!(rr.has_started());
        assert!(rr.succeeded().is_none());
    }

    #[test]
    fn test_initialize_conditions_sets_unknown_once() {
        let mut rr = request();
        rr.status_mut().initialize_conditions();
        let cond = rr.succeeded().unwrap().clone();
        assert!(cond.is_unknown());
        assert_eq!(cond.reason(), REASON_RESOLUTION_IN_PROGRESS);

        rr.status_mut().mark_failed(REASON_RESOLUTION_FAILED, "nope");
        rr.status_mut().initialize_conditions();
        assert!(rr.succeeded().unwrap().is_false());
        assert_eq!(rr.status.as_ref().unwrap().conditions.len(), 1);
    }

    #[test]
    fn test_terminal_states_are_done() {
        let mut rr = request();
        rr.status_mut().mark_succeeded();
        assert!(rr.is_done());
        assert!(!rr.has_started());

        let mut rr = request();
        rr.status_mut().mark_failed(REASON_RESOLUTION_FAILED, "boom");
        assert!(rr.is_done());
        assert_eq!(rr.succeeded().unwrap().message(), "boom");
    }

    #[test]
    fn test_record_wire_format() {
        let mut rr = request();
        rr.status_mut().data = "eA==".into();
        rr.status_mut().mark_succeeded();
        let value = serde_json::to_value(&rr).unwrap();
        assert_eq!(value["apiVersion"], API_VERSION);
        assert_eq!(value["kind"], KIND);
        assert_eq!(value["spec"]["parameters"]["url"], "r");
        assert_eq!(value["status"]["data"], "eA==");
        assert_eq!(value["status"]["conditions"][0]["type"], "Succeeded");
    }

    #[test]
    fn test_key_requires_namespace() {
        let mut rr = request();
        assert_eq!(rr.key().unwrap().to_string(), "default/fetch-pipeline");
        rr.metadata.namespace = None;
        assert!(matches!(rr.key(), Err(Error::MissingField(_))));
    }

    #[test]
    fn test_object_key_parse() {
        let key: ObjectKey = "ns/name".parse().unwrap();
        assert_eq!(key, ObjectKey::new("ns", "name"));
        assert!("no-slash".parse::<ObjectKey>().is_err());
        assert!("/name".parse::<ObjectKey>().is_err());
        assert!("a/b/c".parse::<ObjectKey>().is_err());
    }

    #[test]
    fn test_crd_manifest_names_group() {
        let yaml = ResourceRequest::crd_manifest().unwrap();
        assert!(yaml.contains("resourcerequests.resolution.tekton.dev"));
    }
}
