//! Cluster capabilities consumed by the reconciliation core.
//!
//! Everything the core needs from the Kubernetes API goes through
//! [`ClusterClient`], so operations can run against a live cluster
//! ([`KubeCluster`]) or the in-memory fake ([`MemoryCluster`]).

mod live;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::live::KubeCluster;
pub use self::memory::{MemoryCluster, MutatingCall};

/// Errors returned by cluster operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The named object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency failure (stale resource version or lost create race).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server rejected the request.
    #[error("API error: {code} - {message}")]
    Api { code: u16, message: String },

    /// Transport, auth or client configuration failure.
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),
}

impl ClusterError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message),
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            kube::Error::Api(ae) => Self::Api {
                code: ae.code,
                message: ae.message,
            },
            other => Self::Kube(other),
        }
    }
}

/// A pod as seen by node discovery and restarts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    /// Node the pod is scheduled on, if any.
    pub node: Option<String>,
}

impl PodInfo {
    #[must_use]
    pub fn new(namespace: &str, name: &str, node: Option<&str>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            node: node.map(ToString::to_string),
        }
    }
}

/// ConfigMap payload plus its concurrency token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredConfigMap {
    pub data: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

/// Kubernetes operations used by the tool.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Names of all nodes.
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError>;

    /// Pods in all namespaces.
    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError>;

    /// Whether a namespace exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError>;

    /// Fetch a ConfigMap, `None` if absent.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredConfigMap>, ClusterError>;

    /// Create a ConfigMap, failing with `Conflict` if it already exists.
    /// Returns the new resource version.
    async fn create_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<String>, ClusterError>;

    /// Replace a ConfigMap, failing with `Conflict` if `resource_version` is stale.
    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
        resource_version: &str,
    ) -> Result<Option<String>, ClusterError>;

    /// Delete a ConfigMap. Returns `false` if it did not exist.
    async fn delete_config_map(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<bool, ClusterError>;

    /// Delete a single pod.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
