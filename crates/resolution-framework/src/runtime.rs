//! Runs a resolver under `kube::runtime::Controller` against the API server.
//!
//! The kube controller supplies the watch, the per-object queue that never
//! runs one record twice at once, and delayed requeues. Each pass is the
//! same lifecycle and resolve stage [`crate::ResolverController`] runs in
//! process: a record left in progress comes back as
//! `Action::requeue(timeout - elapsed)`, anything else waits for the next
//! change.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube::runtime::watcher;
use parking_lot::Mutex;
use resolution_config::{ConfigStore, FrameworkConfig};
use resolution_types::{ObjectKey, ResourceRequest};
use tokio_util::sync::CancellationToken;

use crate::controller::register;
use crate::error::{FrameworkError, StoreError};
use crate::queue::Backoff;
use crate::reconciler::Reconciler;
use crate::resolver::{Params, Resolver};
use crate::selector::{label_selector, queue_name};
use crate::store::KubeRecordStore;

/// Per-key exponential retry delays for failed passes.
struct Retries {
    backoff: Backoff,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl Retries {
    fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay(*count);
        *count = count.saturating_add(1);
        delay
    }

    fn forget(&self, key: &ObjectKey) {
        self.failures.lock().remove(key);
    }
}

struct Context {
    name: String,
    reconciler: Reconciler<KubeRecordStore>,
    retries: Retries,
}

impl Context {
    async fn pass(&self, key: &ObjectKey) -> Result<Option<Duration>, StoreError> {
        let outcome = self.reconciler.reconcile(key).await?;
        let Some(requeue_after) = outcome.requeue_after() else {
            tracing::debug!(resolver = %self.name, key = %key, ?outcome, "reconciled");
            return Ok(None);
        };
        let resolved = self.reconciler.resolve(key).await?;
        tracing::debug!(resolver = %self.name, key = %key, outcome = ?resolved, "resolve stage finished");
        Ok(Some(requeue_after))
    }
}

async fn reconcile(record: Arc<ResourceRequest>, ctx: Arc<Context>) -> Result<Action, StoreError> {
    let key = record.key()?;
    let action = match ctx.pass(&key).await? {
        Some(requeue_after) => Action::requeue(requeue_after),
        None => Action::await_change(),
    };
    ctx.retries.forget(&key);
    Ok(action)
}

fn error_policy(record: Arc<ResourceRequest>, error: &StoreError, ctx: Arc<Context>) -> Action {
    let Ok(key) = record.key() else {
        tracing::warn!(resolver = %ctx.name, error = %error, "skipping unaddressable record");
        return Action::await_change();
    };
    let delay = ctx.retries.next_delay(&key);
    if error.is_conflict() {
        tracing::warn!(resolver = %ctx.name, key = %key, ?delay, "status write conflicted, retrying");
    } else {
        tracing::warn!(resolver = %ctx.name, key = %key, error = %error, ?delay, "reconcile failed, retrying");
    }
    Action::requeue(delay)
}

/// Dispatch runtime for a single resolver backed by the API server.
pub struct ClusterController {
    name: String,
    selector: Params,
    api: Api<ResourceRequest>,
    context: Arc<Context>,
    workers: usize,
}

impl ClusterController {
    /// Validate and initialize `resolver`, then wire it to `store`.
    pub async fn new<R>(
        resolver: R,
        store: Arc<KubeRecordStore>,
        config_store: ConfigStore,
        config: &FrameworkConfig,
    ) -> Result<Self, FrameworkError>
    where
        R: Resolver + 'static,
    {
        let (resolver, selector) = register(resolver, config).await?;
        let name = resolver.name().to_string();
        let api = store.scope().clone();
        let reconciler = Reconciler::new(resolver, store, config_store, config.default_timeout);
        tracing::info!(resolver = %name, controller = %queue_name(&name), "resolver registered");

        Ok(Self {
            context: Arc::new(Context {
                name: name.clone(),
                reconciler,
                retries: Retries::new(Backoff {
                    base: config.conflict_backoff_base,
                    max: config.conflict_backoff_max,
                }),
            }),
            name,
            selector,
            api,
            workers: config.workers,
        })
    }

    /// Resolver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one pass for `key`. Returns the delay of the re-check the
    /// controller schedules for a record left in progress.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, StoreError> {
        self.context.pass(key).await
    }

    /// Watch records carrying the resolver's labels and reconcile them
    /// until `shutdown` fires.
    ///
    /// The initial list of the watch covers records created before this
    /// replica started.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), FrameworkError> {
        let watch = watcher::Config::default().labels(&label_selector(&self.selector));
        let concurrency = u16::try_from(self.workers).unwrap_or(u16::MAX);
        tracing::info!(resolver = %self.name, workers = concurrency, "controller running");

        let name = &self.name;
        Controller::new(self.api.clone(), watch)
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .graceful_shutdown_on(shutdown.cancelled_owned())
            .run(reconcile, error_policy, Arc::clone(&self.context))
            .for_each(|result| async move {
                match result {
                    Ok((object, action)) => {
                        tracing::debug!(resolver = %name, object = %object, ?action, "reconciled");
                    }
                    Err(e) => tracing::warn!(resolver = %name, error = %e, "controller error"),
                }
            })
            .await;

        tracing::info!(resolver = %self.name, "controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_per_key_until_forgotten() {
        let retries = Retries::new(Backoff {
            base: Duration::from_millis(10),
            max: Duration::from_millis(25),
        });
        let a = ObjectKey::new("default", "a");
        let b = ObjectKey::new("default", "b");

        assert_eq!(retries.next_delay(&a), Duration::from_millis(10));
        assert_eq!(retries.next_delay(&a), Duration::from_millis(20));
        assert_eq!(retries.next_delay(&a), Duration::from_millis(25));
        assert_eq!(retries.next_delay(&b), Duration::from_millis(10));

        retries.forget(&a);
        assert_eq!(retries.next_delay(&a), Duration::from_millis(10));
    }
}
