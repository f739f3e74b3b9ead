//! In-memory [`ClusterClient`] that records every call.
//!
//! Used by the test suites to exercise the core without a cluster. It
//! enforces resource-version preconditions like the API server does and can
//! be scripted to return conflicts or fail individual pod deletions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ClusterClient, ClusterError, PodInfo, StoredConfigMap};

/// A call that changes cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutatingCall {
    CreateConfigMap { namespace: String, name: String },
    ReplaceConfigMap { namespace: String, name: String },
    DeleteConfigMap { namespace: String, name: String },
    DeletePod { namespace: String, name: String },
}

#[derive(Default)]
struct State {
    nodes: Vec<String>,
    pods: Vec<PodInfo>,
    namespaces: BTreeSet<String>,
    config_maps: BTreeMap<(String, String), StoredConfigMap>,
    next_version: u64,
    pending_conflicts: u32,
    failing_pods: BTreeSet<(String, String)>,
    slow_pods: BTreeMap<(String, String), Duration>,
    interleaved_write: Option<((String, String), BTreeMap<String, String>)>,
    mutations: Vec<MutatingCall>,
    total_calls: usize,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn store(&mut self, key: (String, String), data: BTreeMap<String, String>) -> String {
        let version = self.bump_version();
        self.config_maps.insert(
            key,
            StoredConfigMap {
                data,
                resource_version: Some(version.clone()),
            },
        );
        version
    }

    /// Land a pending foreign write ahead of the caller's mutation.
    fn apply_interleaved_write(&mut self) {
        if let Some((key, data)) = self.interleaved_write.take() {
            self.store(key, data);
        }
    }

    fn take_scripted_conflict(&mut self, what: &str) -> Result<(), ClusterError> {
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(ClusterError::Conflict(format!(
                "{what}: the object has been modified; please apply your changes to the latest version"
            )));
        }
        Ok(())
    }
}

/// Fake cluster holding nodes, pods, namespaces and ConfigMaps in memory.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add nodes to the fake.
    #[must_use]
    pub fn with_nodes<I, S>(self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().nodes.extend(nodes.into_iter().map(Into::into));
        self
    }

    /// Add a pod scheduled on `node`.
    #[must_use]
    pub fn with_pod(self, namespace: &str, name: &str, node: Option<&str>) -> Self {
        self.lock().pods.push(PodInfo::new(namespace, name, node));
        self
    }

    /// Register a namespace.
    #[must_use]
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Seed a ConfigMap; it gets a fresh resource version.
    #[must_use]
    pub fn with_config_map<I, K, V>(self, namespace: &str, name: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.put_config_map(namespace, name, data);
        self
    }

    /// Overwrite a ConfigMap as a concurrent writer would.
    pub fn put_config_map<I, K, V>(&self, namespace: &str, name: &str, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.lock()
            .store((namespace.to_string(), name.to_string()), data);
    }

    /// Overwrite a ConfigMap right before the next ConfigMap write or delete
    /// is handled, as a writer racing the caller would.
    pub fn write_before_next_mutation<I, K, V>(&self, namespace: &str, name: &str, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.lock().interleaved_write = Some(((namespace.to_string(), name.to_string()), data));
    }

    /// Make the next `count` ConfigMap writes or deletes fail with `Conflict`.
    pub fn fail_next_writes_with_conflict(&self, count: u32) {
        self.lock().pending_conflicts = count;
    }

    /// Make deletion of a specific pod fail.
    pub fn fail_pod_deletion(&self, namespace: &str, name: &str) {
        self.lock()
            .failing_pods
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Make deletion of a specific pod take `delay` before it is applied.
    pub fn delay_pod_deletion(&self, namespace: &str, name: &str, delay: Duration) {
        self.lock()
            .slow_pods
            .insert((namespace.to_string(), name.to_string()), delay);
    }

    /// Current contents of a ConfigMap.
    #[must_use]
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<StoredConfigMap> {
        self.lock()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Pods still present.
    #[must_use]
    pub fn pods(&self) -> Vec<PodInfo> {
        self.lock().pods.clone()
    }

    /// Every successful or attempted mutating call, in order.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<MutatingCall> {
        self.lock().mutations.clone()
    }

    /// Number of calls of any kind made against the fake.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().total_calls
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.nodes.clone())
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.pods.clone())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.namespaces.contains(namespace))
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredConfigMap>, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Option<String>, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.mutations.push(MutatingCall::CreateConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.apply_interleaved_write();
        state.take_scripted_conflict(name)?;

        let key = (namespace.to_string(), name.to_string());
        if state.config_maps.contains_key(&key) {
            return Err(ClusterError::Conflict(format!(
                "configmaps \"{name}\" already exists"
            )));
        }
        let version = state.store(key, data.clone());
        Ok(Some(version))
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
        resource_version: &str,
    ) -> Result<Option<String>, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.mutations.push(MutatingCall::ReplaceConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.apply_interleaved_write();
        state.take_scripted_conflict(name)?;

        let key = (namespace.to_string(), name.to_string());
        let current = state
            .config_maps
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("configmaps \"{name}\" not found")))?;
        if current.resource_version.as_deref() != Some(resource_version) {
            return Err(ClusterError::Conflict(format!(
                "configmaps \"{name}\": resource version {resource_version} is stale"
            )));
        }
        let version = state.store(key, data.clone());
        Ok(Some(version))
    }

    async fn delete_config_map(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<bool, ClusterError> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.mutations.push(MutatingCall::DeleteConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.apply_interleaved_write();
        state.take_scripted_conflict(name)?;

        let key = (namespace.to_string(), name.to_string());
        let Some(current) = state.config_maps.get(&key) else {
            return Ok(false);
        };
        if let Some(expected) = resource_version {
            if current.resource_version.as_deref() != Some(expected) {
                return Err(ClusterError::Conflict(format!(
                    "configmaps \"{name}\": precondition failed for resource version {expected}"
                )));
            }
        }
        state.config_maps.remove(&key);
        Ok(true)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let key = (namespace.to_string(), name.to_string());
        let delay = {
            let mut state = self.lock();
            state.total_calls += 1;
            state.mutations.push(MutatingCall::DeletePod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            state.slow_pods.get(&key).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.failing_pods.contains(&key) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("failed to delete pod {namespace}/{name}"),
            });
        }
        let before = state.pods.len();
        state
            .pods
            .retain(|pod| !(pod.namespace == namespace && pod.name == name));
        if state.pods.len() == before {
            return Err(ClusterError::NotFound(format!("pods \"{name}\" not found")));
        }
        Ok(())
    }
}
