use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Api, Client, ResourceExt,
    api::{DeleteParams, ListParams, PostParams},
};
use thiserror::Error;

use crate::replica::Replicated;

const FIELD_MANAGER: &str = "replicator.homerow.ca";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Kube(kube::Error),
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound,
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            other => Self::Kube(other),
        }
    }
}

/// The cluster as seen by one controller: reads and writes of a single
/// replicated kind plus the namespace listing.
///
/// `update` is guarded by the resourceVersion carried in the object, so a
/// stale write fails with [`StoreError::Conflict`] instead of clobbering a
/// concurrent edit. Nothing here retries.
#[async_trait]
pub trait ObjectStore<K: Replicated>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError>;

    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Replicated>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl<K: Replicated> ObjectStore<K> for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let namespaces = Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;

        Ok(namespaces.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj.namespace().unwrap_or_default();

        Ok(self
            .api::<K>(&namespace)
            .create(&Self::post_params(), obj)
            .await?)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj.namespace().unwrap_or_default();

        Ok(self
            .api::<K>(&namespace)
            .replace(&obj.name_any(), &Self::post_params(), obj)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await?;

        Ok(())
    }
}
