//! Record store backed by the Kubernetes API server.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use resolution_types::{ObjectKey, ResourceRequest};

use super::{RecordEvent, RecordStore, RecordStream};
use crate::error::{Result, StoreError};

/// `ResourceRequest` records stored as custom resources.
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
    scope: Api<ResourceRequest>,
}

impl KubeRecordStore {
    /// Watch and list records across all namespaces.
    pub fn new(client: Client) -> Self {
        Self {
            scope: Api::all(client.clone()),
            client,
        }
    }

    /// Watch and list records in one namespace only.
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            scope: Api::namespaced(client.clone(), namespace),
            client,
        }
    }

    /// Connect using the ambient kubeconfig or in-cluster config.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// The API handle that lists and watches records.
    pub fn scope(&self) -> &Api<ResourceRequest> {
        &self.scope
    }

    fn api(&self, namespace: &str) -> Api<ResourceRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn classify(err: kube::Error, key: &ObjectKey) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(key.clone())
        }
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict { key: key.clone() },
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(key.clone()),
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl RecordStore for KubeRecordStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceRequest>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn list(&self) -> Result<Vec<ResourceRequest>> {
        Ok(self.scope.list(&ListParams::default()).await?.items)
    }

    async fn create(&self, record: &ResourceRequest) -> Result<ResourceRequest> {
        let key = record.key()?;
        self.api(&key.namespace)
            .create(&PostParams::default(), record)
            .await
            .map_err(|e| classify(e, &key))
    }

    async fn update_status(&self, record: &ResourceRequest) -> Result<ResourceRequest> {
        let key = record.key()?;
        let body = serde_json::to_vec(record)?;
        self.api(&key.namespace)
            .replace_status(&record.name_any(), &PostParams::default(), body)
            .await
            .map_err(|e| classify(e, &key))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.api(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, key))?;
        Ok(())
    }

    fn watch(&self) -> RecordStream {
        watcher(self.scope.clone(), watcher::Config::default())
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::Apply(rr)) | Ok(watcher::Event::InitApply(rr)) => {
                        Some(Ok(RecordEvent::Upserted(rr)))
                    }
                    Ok(watcher::Event::Delete(rr)) => Some(Ok(RecordEvent::Deleted(rr))),
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(StoreError::Watch(e.to_string()))),
                }
            })
            .boxed()
    }
}
