//! [`ClusterClient`] backed by a live Kubernetes API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams, Preconditions};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use super::{ClusterClient, ClusterError, PodInfo, StoredConfigMap};

/// Kubernetes client wrapper.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Verify the API server is reachable with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns the client error verbatim; auth problems are not retried.
    pub async fn check_connection(&self) -> Result<String, ClusterError> {
        let version = self.client.apiserver_version().await?;
        info!(
            major = %version.major,
            minor = %version.minor,
            "Connected to Kubernetes API server"
        );
        Ok(version.git_version)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_map(namespace: &str, name: &str, data: &BTreeMap<String, String>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(data.clone()),
            ..ConfigMap::default()
        }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        let names: Vec<String> = list.items.iter().map(ResourceExt::name_any).collect();
        debug!(count = names.len(), "Listed nodes");
        Ok(names)
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;
        let pods: Vec<PodInfo> = list
            .items
            .iter()
            .map(|pod| PodInfo {
                namespace: pod.namespace().unwrap_or_default(),
                name: pod.name_any(),
                node: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
            })
            .collect();
        debug!(count = pods.len(), "Listed pods across all namespaces");
        Ok(pods)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(namespace).await?.is_some())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredConfigMap>, ClusterError> {
        let found = self.config_maps(namespace).get_opt(name).await?;
        Ok(found.map(|cm| StoredConfigMap {
            resource_version: cm.resource_version(),
            data: cm.data.unwrap_or_default(),
        }))
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<String>, ClusterError> {
        let cm = Self::config_map(namespace, name, data);
        let created = self
            .config_maps(namespace)
            .create(&PostParams::default(), &cm)
            .await?;
        Ok(created.resource_version())
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
        resource_version: &str,
    ) -> Result<Option<String>, ClusterError> {
        let mut cm = Self::config_map(namespace, name, data);
        // The API server rejects the PUT with 409 if this version is stale.
        cm.metadata.resource_version = Some(resource_version.to_string());
        let replaced = self
            .config_maps(namespace)
            .replace(name, &PostParams::default(), &cm)
            .await?;
        Ok(replaced.resource_version())
    }

    async fn delete_config_map(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<bool, ClusterError> {
        let params = DeleteParams {
            preconditions: resource_version.map(|rv| Preconditions {
                resource_version: Some(rv.to_string()),
                uid: None,
            }),
            ..DeleteParams::default()
        };
        match self.config_maps(namespace).delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(e) => match ClusterError::from(e) {
                ClusterError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
