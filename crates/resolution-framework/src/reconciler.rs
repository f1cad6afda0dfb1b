//! Reconciliation of a single record key.
//!
//! A pass has two stages. [`Reconciler::reconcile`] runs the lifecycle
//! state machine: it initializes the condition, settles records that have
//! data or are past their budget, and otherwise persists the in-progress
//! condition and reports how long until the budget runs out.
//! [`Reconciler::resolve`] then runs the resolver against the stored
//! in-progress record and writes the terminal condition.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use resolution_config::ConfigStore;
use resolution_types::{
    ANNOTATION_KEY_RESOLVED_BY, ConditionStatus, ObjectKey, RESERVED_ANNOTATION_PREFIX,
    ResolvedResource, ResourceRequest, ResourceRequestStatus,
};

use crate::error::{ResolverError, Result};
use crate::resolver::{Params, Resolver, ResolverContext};
use crate::selector::selector_matches;
use crate::state::{Decision, apply, evaluate};
use crate::store::RecordStore;

/// Result of a reconciliation stage that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record no longer exists.
    Missing,
    /// The record belongs to another resolver and was not touched.
    NotClaimed,
    /// The record was already terminal.
    AlreadyDone,
    /// The computed status equals the stored one; nothing was written.
    Unchanged,
    /// A new status was written.
    Updated(ConditionStatus),
    /// The record is stored as in progress and must be checked again once
    /// `requeue_after` has passed.
    InProgress { requeue_after: Duration },
}

impl ReconcileOutcome {
    /// Delay of the re-check the caller has to schedule, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::InProgress { requeue_after } => Some(*requeue_after),
            _ => None,
        }
    }
}

/// Runs the lifecycle state machine and the resolve stage for one resolver.
pub struct Reconciler<S> {
    resolver: Arc<dyn Resolver>,
    selector: Params,
    store: Arc<S>,
    config: ConfigStore,
    default_timeout: Duration,
}

impl<S: RecordStore> Reconciler<S> {
    /// Create a reconciler. The selector is captured once.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        store: Arc<S>,
        config: ConfigStore,
        default_timeout: Duration,
    ) -> Self {
        Self {
            selector: resolver.selector(),
            resolver,
            store,
            config,
            default_timeout,
        }
    }

    /// The resolver this reconciler drives.
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Run the lifecycle state machine for the record stored under `key`.
    ///
    /// Errors are store failures, including version conflicts; the caller
    /// retries the whole pass.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(mut record) = self.claim(key).await? else {
            return self.unclaimed(key).await;
        };

        let observed = record.status.clone();
        record.status_mut().initialize_conditions();

        let ctx = self.context(key);
        let timeout = self.resolver.resolution_timeout(&ctx, self.default_timeout);

        let decision = evaluate(&record, Utc::now(), timeout);
        match &decision {
            Decision::Noop => return Ok(ReconcileOutcome::AlreadyDone),
            Decision::TimeOut { message } => {
                tracing::warn!(resolver = %self.resolver.name(), key = %key, %message, "record timed out");
            }
            Decision::InProgress { .. } => {
                // Invalid requests fail straight away and are never stored
                // as in progress.
                if let Err(e) = self.resolver.validate_params(&ctx, record.parameters()) {
                    self.record_outcome(key, record.status_mut(), Err(e));
                    return self.write(key, &record, observed).await;
                }
            }
            Decision::Succeed => {}
        }
        apply(&decision, record.status_mut());

        let written = self.write(key, &record, observed).await?;
        match decision {
            Decision::InProgress { requeue_after } => {
                tracing::debug!(
                    resolver = %self.resolver.name(),
                    key = %key,
                    requeue_after = ?requeue_after,
                    "in progress"
                );
                Ok(ReconcileOutcome::InProgress { requeue_after })
            }
            _ => Ok(written),
        }
    }

    /// Run the resolver for a record stored as in progress and write the
    /// terminal condition.
    ///
    /// The resolve deadline is what is left of the record's budget. A
    /// record that is no longer in progress is left alone.
    pub async fn resolve(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(mut record) = self.claim(key).await? else {
            return self.unclaimed(key).await;
        };

        let ctx = self.context(key);
        let timeout = self.resolver.resolution_timeout(&ctx, self.default_timeout);
        let remaining = match evaluate(&record, Utc::now(), timeout) {
            Decision::InProgress { requeue_after } => requeue_after,
            _ => return Ok(ReconcileOutcome::Unchanged),
        };

        let observed = record.status.clone();
        let outcome = self
            .run_resolver(&ctx, record.parameters(), remaining, timeout)
            .await;
        self.record_outcome(key, record.status_mut(), outcome);
        self.write(key, &record, observed).await
    }

    /// Fetch the record if this resolver owns it and it is not terminal.
    async fn claim(&self, key: &ObjectKey) -> Result<Option<ResourceRequest>> {
        Ok(self.store.get(key).await?.filter(|record| {
            selector_matches(&self.selector, record.labels()) && !record.is_done()
        }))
    }

    /// Explain why [`Reconciler::claim`] came back empty.
    async fn unclaimed(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        match self.store.get(key).await? {
            None => {
                tracing::debug!(resolver = %self.resolver.name(), key = %key, "record gone");
                Ok(ReconcileOutcome::Missing)
            }
            Some(record) if !selector_matches(&self.selector, record.labels()) => {
                Ok(ReconcileOutcome::NotClaimed)
            }
            Some(_) => Ok(ReconcileOutcome::AlreadyDone),
        }
    }

    fn context(&self, key: &ObjectKey) -> ResolverContext {
        ResolverContext::new(self.config.snapshot()).with_namespace(&key.namespace)
    }

    async fn run_resolver(
        &self,
        ctx: &ResolverContext,
        params: &Params,
        deadline: Duration,
        budget: Duration,
    ) -> std::result::Result<Box<dyn ResolvedResource>, ResolverError> {
        self.resolver.validate_params(ctx, params)?;
        // The deadline is what is left of the budget; errors report the budget.
        let resource = tokio::time::timeout(deadline, self.resolver.resolve(ctx, params))
            .await
            .map_err(|_| ResolverError::TimedOut(budget))??;
        if resource.data().is_empty() {
            return Err(ResolverError::fetch("resolver returned an empty payload"));
        }
        Ok(resource)
    }

    fn record_outcome(
        &self,
        key: &ObjectKey,
        status: &mut ResourceRequestStatus,
        outcome: std::result::Result<Box<dyn ResolvedResource>, ResolverError>,
    ) {
        match outcome {
            Ok(resource) => {
                status.data = STANDARD.encode(resource.data());
                status.annotations = self.annotations(resource.annotations());
                status.mark_succeeded();
                tracing::info!(
                    resolver = %self.resolver.name(),
                    key = %key,
                    bytes = resource.data().len(),
                    "resolved"
                );
            }
            Err(e) => {
                tracing::warn!(
                    resolver = %self.resolver.name(),
                    key = %key,
                    reason = e.reason(),
                    error = %e,
                    "resolution failed"
                );
                status.mark_failed(e.reason(), e.to_string());
            }
        }
    }

    /// Resolver annotations first, reserved keys on top.
    fn annotations(&self, mut resolved: BTreeMap<String, String>) -> BTreeMap<String, String> {
        resolved.retain(|key, _| !key.starts_with(RESERVED_ANNOTATION_PREFIX));
        resolved.insert(
            ANNOTATION_KEY_RESOLVED_BY.to_string(),
            self.resolver.name().to_string(),
        );
        resolved
    }

    async fn write(
        &self,
        key: &ObjectKey,
        record: &ResourceRequest,
        observed: Option<ResourceRequestStatus>,
    ) -> Result<ReconcileOutcome> {
        if record.status == observed {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let status = record
            .succeeded()
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown);
        self.store.update_status(record).await?;
        tracing::debug!(resolver = %self.resolver.name(), key = %key, %status, "status written");
        Ok(ReconcileOutcome::Updated(status))
    }
}
