//! Persistence seam for `ResourceRequest` records.
//!
//! The store is the only shared mutable state in the system. Every status
//! write is an optimistic-concurrency update against the record's last
//! observed resource version; a mismatch surfaces as
//! [`StoreError::Conflict`](crate::error::StoreError::Conflict) and the
//! caller re-runs its reconciliation from a fresh read.

mod cluster;
mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use resolution_types::{ObjectKey, ResourceRequest};

use crate::error::{Result, StoreError};

pub use cluster::KubeRecordStore;
pub use memory::MemoryRecordStore;

/// A change observed on the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// The record was created or updated.
    Upserted(ResourceRequest),
    /// The record was removed.
    Deleted(ResourceRequest),
}

impl RecordEvent {
    /// The record the event refers to.
    pub fn record(&self) -> &ResourceRequest {
        match self {
            Self::Upserted(record) | Self::Deleted(record) => record,
        }
    }
}

/// Stream of store changes.
pub type RecordStream = BoxStream<'static, std::result::Result<RecordEvent, StoreError>>;

/// Read, write and watch access to records.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Fetch a record. `Ok(None)` when it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceRequest>>;

    /// List every record the store can see, without filtering.
    async fn list(&self) -> Result<Vec<ResourceRequest>>;

    /// Persist a new record and return it as stored.
    async fn create(&self, record: &ResourceRequest) -> Result<ResourceRequest>;

    /// Replace the status of a record. The record's resource version must
    /// match the stored one.
    async fn update_status(&self, record: &ResourceRequest) -> Result<ResourceRequest>;

    /// Remove a record.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Subscribe to changes made after this call.
    fn watch(&self) -> RecordStream;
}
