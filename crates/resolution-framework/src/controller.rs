//! Binds one resolver to the watch/reconcile runtime.
//!
//! Startup order: validate the framework config, check the selector carries
//! the resolver-type label, then run the resolver's one-time
//! initialization. Any failure here is returned before a single record is
//! read.
//!
//! At run time the store's change stream feeds a coalescing work queue
//! through the selector filter, and a fixed pool of workers drains it. A
//! gap in the change stream triggers a full re-list.
//!
//! Against the API server, [`crate::runtime::ClusterController`] runs the
//! same passes under `kube::runtime::Controller` instead.

use std::sync::Arc;

use futures::StreamExt;
use resolution_config::{ConfigStore, FrameworkConfig};
use resolution_types::ObjectKey;
use tokio_util::sync::CancellationToken;

use crate::error::{FrameworkError, StoreError};
use crate::queue::{Backoff, WorkQueue};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::resolver::{Params, Resolver};
use crate::selector::{queue_name, selector_matches, validate_selector};
use crate::store::{RecordEvent, RecordStore};

/// Dispatch runtime for a single resolver.
pub struct ResolverController<S> {
    name: String,
    selector: Params,
    store: Arc<S>,
    reconciler: Reconciler<S>,
    queue: WorkQueue<ObjectKey>,
    workers: usize,
}

impl<S: RecordStore> ResolverController<S> {
    /// Validate and initialize `resolver`, then wire it to `store`.
    pub async fn new<R>(
        resolver: R,
        store: Arc<S>,
        config_store: ConfigStore,
        config: &FrameworkConfig,
    ) -> Result<Self, FrameworkError>
    where
        R: Resolver + 'static,
    {
        let (resolver, selector) = register(resolver, config).await?;
        let name = resolver.name().to_string();

        let queue = WorkQueue::new(
            queue_name(&name),
            Backoff {
                base: config.conflict_backoff_base,
                max: config.conflict_backoff_max,
            },
        );
        let reconciler = Reconciler::new(
            resolver,
            Arc::clone(&store),
            config_store,
            config.default_timeout,
        );
        tracing::info!(resolver = %name, queue = %queue.name(), "resolver registered");

        Ok(Self {
            name,
            selector,
            store,
            reconciler,
            queue,
            workers: config.workers,
        })
    }

    /// Resolver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The work queue feeding this controller.
    pub fn queue(&self) -> &WorkQueue<ObjectKey> {
        &self.queue
    }

    /// Route a store event. Returns whether a key was queued.
    ///
    /// Deletions are never delivered: resolvers own no cleanup.
    pub fn handle_event(&self, event: &RecordEvent) -> bool {
        let RecordEvent::Upserted(record) = event else {
            return false;
        };
        if !selector_matches(&self.selector, record.labels()) {
            return false;
        }
        match record.key() {
            Ok(key) => {
                tracing::debug!(resolver = %self.name, key = %key, "queued");
                self.queue.add(key);
                true
            }
            Err(e) => {
                tracing::warn!(resolver = %self.name, error = %e, "skipping unaddressable record");
                false
            }
        }
    }

    /// Queue every stored record, regardless of labels. Called when this
    /// replica becomes the active one.
    pub async fn promote(&self) -> Result<usize, StoreError> {
        let records = self.store.list().await?;
        let mut queued = 0;
        for record in &records {
            if let Ok(key) = record.key() {
                self.queue.add(key);
                queued += 1;
            }
        }
        tracing::info!(resolver = %self.name, queued, "promoted; existing records queued");
        Ok(queued)
    }

    /// Run one full pass for `key`.
    ///
    /// A record left in progress gets a re-check queued for when its budget
    /// runs out, then the resolve stage runs against the stored record.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, StoreError> {
        let outcome = self.reconciler.reconcile(key).await?;
        let Some(requeue_after) = outcome.requeue_after() else {
            return Ok(outcome);
        };
        self.queue.add_after(key.clone(), requeue_after);
        self.reconciler.resolve(key).await
    }

    /// Take one key off the queue and reconcile it. Returns `false` once the
    /// queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        match self.reconcile(&key).await {
            Ok(outcome) => {
                tracing::debug!(resolver = %self.name, key = %key, ?outcome, "reconciled");
                self.queue.forget(&key);
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(resolver = %self.name, key = %key, "status write conflicted, retrying");
                self.queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                tracing::warn!(resolver = %self.name, key = %key, error = %e, "reconcile failed, retrying");
                self.queue.add_rate_limited(key.clone());
            }
        }
        self.queue.done(&key);
        true
    }

    /// Watch the store and reconcile until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), FrameworkError> {
        // Subscribe before listing so nothing created in between is missed.
        let mut events = self.store.watch();
        self.promote().await?;

        let workers: Vec<_> = (0..self.workers)
            .map(|_| {
                let this = Arc::clone(&self);
                tokio::spawn(async move { while this.process_next().await {} })
            })
            .collect();
        tracing::info!(resolver = %self.name, workers = workers.len(), "controller running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        self.handle_event(&event);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(resolver = %self.name, error = %e, "watch error, re-listing");
                        if let Err(e) = self.promote().await {
                            tracing::error!(resolver = %self.name, error = %e, "re-list failed");
                        }
                    }
                    None => {
                        tracing::warn!(resolver = %self.name, "watch stream ended");
                        break;
                    }
                },
            }
        }

        self.queue.shutdown();
        for worker in futures::future::join_all(workers).await {
            if let Err(e) = worker {
                tracing::error!(resolver = %self.name, error = %e, "worker panicked");
            }
        }
        tracing::info!(resolver = %self.name, "controller stopped");
        Ok(())
    }
}

/// Startup checks shared by every runtime: validate the framework config,
/// check the selector carries the type label, then initialize the resolver.
pub(crate) async fn register<R>(
    mut resolver: R,
    config: &FrameworkConfig,
) -> Result<(Arc<dyn Resolver>, Params), FrameworkError>
where
    R: Resolver + 'static,
{
    config.validate()?;
    let name = resolver.name().to_string();
    let selector = resolver.selector();
    validate_selector(&name, &selector, &config.resolver_type_label)?;

    resolver
        .initialize()
        .await
        .map_err(|source| FrameworkError::Initialize {
            resolver: name,
            source,
        })?;
    Ok((Arc::new(resolver), selector))
}
