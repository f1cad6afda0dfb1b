//! Lifecycle decisions for a single record.
//!
//! [`evaluate`] is a pure function of the record, the current time and the
//! effective timeout, so the decision table can be tested without a store
//! or a clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use resolution_config::format_duration;
use resolution_types::{
    MESSAGE_WAITING_FOR_RESOLVER, REASON_RESOLUTION_TIMED_OUT, ResourceRequest,
    ResourceRequestStatus,
};

/// What to do with a record on this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Terminal already; leave it alone.
    Noop,
    /// A payload is present; mark it succeeded.
    Succeed,
    /// The end-to-end budget is spent; mark it failed.
    TimeOut { message: String },
    /// Still within budget; `requeue_after` is what remains of it.
    InProgress { requeue_after: Duration },
}

/// Message recorded when a record outlives its budget.
pub fn timeout_message(timeout: Duration) -> String {
    format!(
        "resolution took longer than global timeout of {}",
        format_duration(timeout)
    )
}

/// Time since the record was created. Zero when the creation time is
/// unknown or in the future.
pub fn elapsed(record: &ResourceRequest, now: DateTime<Utc>) -> Duration {
    record
        .created_at()
        .and_then(|created| (now - created).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

/// Decide the next step for `record`. First matching rule wins.
pub fn evaluate(record: &ResourceRequest, now: DateTime<Utc>, timeout: Duration) -> Decision {
    if record.is_done() {
        return Decision::Noop;
    }
    if record.status.as_ref().is_some_and(|s| s.has_data()) {
        return Decision::Succeed;
    }
    let elapsed = elapsed(record, now);
    if elapsed > timeout {
        return Decision::TimeOut {
            message: timeout_message(timeout),
        };
    }
    Decision::InProgress {
        requeue_after: timeout - elapsed,
    }
}

/// Apply a decision to a status. `Noop` leaves it untouched.
pub fn apply(decision: &Decision, status: &mut ResourceRequestStatus) {
    match decision {
        Decision::Noop => {}
        Decision::Succeed => status.mark_succeeded(),
        Decision::TimeOut { message } => {
            status.mark_failed(REASON_RESOLUTION_TIMED_OUT, message.clone())
        }
        Decision::InProgress { .. } => status.mark_in_progress(MESSAGE_WAITING_FOR_RESOLVER),
    }
}
