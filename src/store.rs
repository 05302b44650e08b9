//! Mesh store: list and replace Istio routing resources
//!
//! The routers never talk to the API server directly. They go through
//! [`MeshStore`], which the binary backs with [`KubeMeshStore`] and tests back
//! with mocks or an in-memory store.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, PostParams};
use kube::Client;
use lattice_common::kube_utils::HasApiResource;
use lattice_common::FIELD_MANAGER;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::crd::{from_dynamic, to_dynamic, DestinationRule, VirtualService};
use crate::{Error, Result};

#[cfg(test)]
use mockall::automock;

/// HTTP status the API server returns for a stale resourceVersion
const HTTP_CONFLICT: u16 = 409;

/// Trait abstracting the mesh control plane's resource store
///
/// Lists return every object matching the selector (possibly none). Replaces
/// are whole-object writes guarded by `metadata.resourceVersion`; a stale
/// version fails with [`Error::stale_version`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeshStore: Send + Sync {
    /// List VirtualServices in `namespace` matching the label selector
    async fn list_virtual_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<VirtualService>>;

    /// Replace a VirtualService, returning the stored object
    async fn replace_virtual_service(
        &self,
        namespace: &str,
        resource: &VirtualService,
    ) -> Result<VirtualService>;

    /// List DestinationRules in `namespace` matching the label selector
    async fn list_destination_rules(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<DestinationRule>>;

    /// Replace a DestinationRule, returning the stored object
    async fn replace_destination_rule(
        &self,
        namespace: &str,
        resource: &DestinationRule,
    ) -> Result<DestinationRule>;
}

/// Mesh store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeMeshStore {
    client: Client,
}

impl KubeMeshStore {
    /// Create a new KubeMeshStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: HasApiResource>(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &K::api_resource())
    }

    async fn list<K>(&self, namespace: &str, selector: &str) -> Result<Vec<K>>
    where
        K: HasApiResource + DeserializeOwned,
    {
        let params = ListParams::default().labels(selector);
        let list = self.api::<K>(namespace).list(&params).await?;
        debug!(
            kind = K::KIND,
            namespace = %namespace,
            selector = %selector,
            count = list.items.len(),
            "listed mesh resources"
        );
        list.items
            .into_iter()
            .map(|obj| from_dynamic(obj, K::KIND))
            .collect()
    }

    async fn replace<K>(&self, namespace: &str, name: &str, resource: &K) -> Result<K>
    where
        K: HasApiResource + Serialize + DeserializeOwned,
    {
        let obj = to_dynamic(resource, K::KIND)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let stored = self
            .api::<K>(namespace)
            .replace(name, &params, &obj)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == HTTP_CONFLICT => Error::stale_version(
                    format!("{} {}/{}: {}", K::KIND, namespace, name, resp.message),
                ),
                other => Error::Kube(other),
            })?;
        debug!(kind = K::KIND, namespace = %namespace, name = %name, "replaced mesh resource");
        from_dynamic(stored, K::KIND)
    }
}

#[async_trait]
impl MeshStore for KubeMeshStore {
    async fn list_virtual_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<VirtualService>> {
        self.list(namespace, selector).await
    }

    async fn replace_virtual_service(
        &self,
        namespace: &str,
        resource: &VirtualService,
    ) -> Result<VirtualService> {
        self.replace(namespace, resource.name(), resource).await
    }

    async fn list_destination_rules(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<DestinationRule>> {
        self.list(namespace, selector).await
    }

    async fn replace_destination_rule(
        &self,
        namespace: &str,
        resource: &DestinationRule,
    ) -> Result<DestinationRule> {
        self.replace(namespace, resource.name(), resource).await
    }
}
