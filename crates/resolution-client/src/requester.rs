//! Submitting requests and reading back their outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use resolution_framework::{RecordStore, StoreError};
use resolution_types::{
    LABEL_KEY_RESOLVER_TYPE, ObjectKey, Resource, ResourceRequest, ResourceRequestSpec,
};

use crate::error::{RequestError, Result};
use crate::request::{Request, append_owner_reference};

/// Caller-side entry point: one call per poll.
///
/// The first call creates the record and reports it as in progress. Later
/// calls report progress, the resolved resource, or the failure. How often
/// to poll is up to the caller; [`RequestError::is_retryable`] tells
/// whether polling again makes sense.
pub struct Requester<S> {
    store: Arc<S>,
    type_label: String,
}

impl<S: RecordStore> Requester<S> {
    /// Create a requester that labels records with the default type label.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_type_label(store, LABEL_KEY_RESOLVER_TYPE)
    }

    /// Create a requester that routes with a custom label key.
    pub fn with_type_label(store: Arc<S>, type_label: impl Into<String>) -> Self {
        Self {
            store,
            type_label: type_label.into(),
        }
    }

    /// Submit `request` to the resolver registered for `resolver_type`.
    pub async fn submit(&self, resolver_type: &str, request: &impl Request) -> Result<Resource> {
        let key = ObjectKey::new(request.namespace(), request.name());
        let Some(record) = self.store.get(&key).await? else {
            self.create(resolver_type, request).await?;
            return Err(RequestError::InProgress { key });
        };

        let Some(condition) = record.succeeded().filter(|c| !c.is_unknown()) else {
            // Known limitation: a second caller sharing an in-flight record
            // is not added as an owner, so deleting the first owner can
            // remove the record from under it.
            return Err(RequestError::InProgress { key });
        };

        if condition.is_false() {
            return Err(RequestError::Failed {
                reason: condition.reason().to_string(),
                message: condition.message().to_string(),
                key,
            });
        }

        let status = record.status.clone().unwrap_or_default();
        let data = STANDARD
            .decode(status.data.as_bytes())
            .map_err(|source| RequestError::Decode {
                key: key.clone(),
                source,
            })?;
        tracing::debug!(key = %key, bytes = data.len(), "request resolved");
        Ok(Resource::new(data).with_annotations(status.annotations))
    }

    async fn create(&self, resolver_type: &str, request: &impl Request) -> Result<()> {
        let mut record = ResourceRequest::new(
            request.name(),
            ResourceRequestSpec {
                parameters: request.params().clone(),
            },
        );
        record.metadata.namespace = Some(request.namespace().to_string());
        record.metadata.labels = Some(BTreeMap::from([(
            self.type_label.clone(),
            resolver_type.to_string(),
        )]));
        if let Some(owner) = request.owner_ref() {
            append_owner_reference(&mut record.metadata, owner);
        }

        match self.store.create(&record).await {
            Ok(_) => {
                tracing::info!(
                    namespace = request.namespace(),
                    name = request.name(),
                    resolver_type,
                    "resource request created"
                );
                Ok(())
            }
            // Another caller created it between our read and write.
            Err(StoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
