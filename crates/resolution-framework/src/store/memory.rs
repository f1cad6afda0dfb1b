//! In-process record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use parking_lot::Mutex;
use resolution_types::{ObjectKey, ResourceRequest};
use tokio::sync::broadcast;

use super::{RecordEvent, RecordStore, RecordStream};
use crate::error::{Result, StoreError};

const EVENT_BUFFER: usize = 256;

#[derive(Default)]
struct State {
    records: BTreeMap<ObjectKey, ResourceRequest>,
    version: u64,
    uid: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Versioned, watchable store held in memory.
///
/// Behaves like the API server for the operations the framework uses:
/// resource versions bump on every write, status writes with a stale
/// version are rejected, and watchers see every change.
#[derive(Clone)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<RecordEvent>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            events,
        }
    }

    /// Replace a whole record (spec, metadata and status) with the usual
    /// version check.
    pub fn update(&self, record: &ResourceRequest) -> Result<ResourceRequest> {
        let key = record.key()?;
        let stored = {
            let mut state = self.state.lock();
            let current = state
                .records
                .get(&key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            if current.resource_version() != record.resource_version() {
                return Err(StoreError::Conflict { key });
            }
            let mut next = record.clone();
            next.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
            next.metadata.uid = current.metadata.uid.clone();
            next.metadata.resource_version = Some(state.next_version());
            state.records.insert(key, next.clone());
            next
        };
        let _ = self.events.send(RecordEvent::Upserted(stored.clone()));
        Ok(stored)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceRequest>> {
        Ok(self.state.lock().records.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<ResourceRequest>> {
        Ok(self.state.lock().records.values().cloned().collect())
    }

    async fn create(&self, record: &ResourceRequest) -> Result<ResourceRequest> {
        let key = record.key()?;
        let stored = {
            let mut state = self.state.lock();
            if state.records.contains_key(&key) {
                return Err(StoreError::AlreadyExists(key));
            }
            let mut next = record.clone();
            // A preset creation timestamp is kept.
            if next.metadata.creation_timestamp.is_none() {
                next.metadata.creation_timestamp = Some(Time(Utc::now()));
            }
            state.uid += 1;
            next.metadata.uid = Some(format!("memory-{}", state.uid));
            next.metadata.resource_version = Some(state.next_version());
            state.records.insert(key, next.clone());
            next
        };
        tracing::debug!(record = %stored.key()?, "record created");
        let _ = self.events.send(RecordEvent::Upserted(stored.clone()));
        Ok(stored)
    }

    async fn update_status(&self, record: &ResourceRequest) -> Result<ResourceRequest> {
        let key = record.key()?;
        let stored = {
            let mut state = self.state.lock();
            let current = state
                .records
                .get(&key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            if current.resource_version() != record.resource_version() {
                return Err(StoreError::Conflict { key });
            }
            let mut next = current.clone();
            next.status = record.status.clone();
            next.metadata.resource_version = Some(state.next_version());
            state.records.insert(key, next.clone());
            next
        };
        let _ = self.events.send(RecordEvent::Upserted(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let removed = self
            .state
            .lock()
            .records
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let _ = self.events.send(RecordEvent::Deleted(removed));
        Ok(())
    }

    fn watch(&self) -> RecordStream {
        let rx = self.events.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "memory store watcher lagged");
                    let err = StoreError::Watch(format!("watcher lagged, {missed} events missed"));
                    Some((Err(err), rx))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        }))
    }
}
