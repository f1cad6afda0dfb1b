//! The `Succeeded` condition carried by every record.
//!
//! A record has a single condition of type `Succeeded`. Its status moves
//! from `Unknown` to either `True` or `False` and never back.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Type of the only condition a record carries.
pub const CONDITION_SUCCEEDED: &str = "Succeeded";

/// Tri-state status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single status condition in the knative shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, always [`CONDITION_SUCCEEDED`] for records.
    #[serde(rename = "type")]
    pub type_: String,
    /// Current status.
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When `status` last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a `Succeeded` condition with the given status.
    pub fn succeeded(status: ConditionStatus) -> Self {
        Self {
            type_: CONDITION_SUCCEEDED.to_string(),
            status,
            reason: None,
            message: None,
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Whether the condition is `True`.
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Whether the condition is `False`.
    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    /// Whether the condition is `Unknown`.
    pub fn is_unknown(&self) -> bool {
        self.status == ConditionStatus::Unknown
    }

    /// Reason, or the empty string.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }

    /// Message, or the empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// Move to `status` with the given reason and message.
    ///
    /// `last_transition_time` is only bumped when the status value changes,
    /// so re-applying the same state is a no-op on the serialized form.
    pub fn transition(
        &mut self,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        if self.status != status {
            self.last_transition_time = Some(Utc::now());
        }
        self.status = status;
        self.reason = reason;
        self.message = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_kubernetes_strings() {
        assert_eq!(
            serde_json::to_string(&ConditionStatus::Unknown).unwrap(),
            "\"Unknown\""
        );
        let status: ConditionStatus = serde_json::from_str("\"True\"").unwrap();
        assert_eq!(status, ConditionStatus::True);
    }

    #[test]
    fn test_condition_wire_shape() {
        let mut cond = Condition::succeeded(ConditionStatus::False);
        cond.reason = Some("ResolutionFailed".into());
        cond.message = Some("boom".into());
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["type"], "Succeeded");
        assert_eq!(value["status"], "False");
        assert_eq!(value["reason"], "ResolutionFailed");
        assert!(value.get("lastTransitionTime").is_some());
    }

    #[test]
    fn test_transition_keeps_time_when_status_unchanged() {
        let mut cond = Condition::succeeded(ConditionStatus::Unknown);
        let before = cond.last_transition_time;
        cond.transition(
            ConditionStatus::Unknown,
            Some("ResolutionInProgress".into()),
            Some("waiting for resolver".into()),
        );
        assert_eq!(cond.last_transition_time, before);
        assert_eq!(cond.reason(), "ResolutionInProgress");
    }

    #[test]
    fn test_accessors_default_to_empty() {
        let cond = Condition::succeeded(ConditionStatus::True);
        assert!(cond.is_true());
        assert_eq!(cond.reason(), "");
        assert_eq!(cond.message(), "");
    }
}
