//! Pod restarts so OVN processes pick up new override values.
//!
//! Deleting an `ovnkube-node` pod makes its DaemonSet recreate it with the
//! current environment overrides. Deletions are grouped per node and fanned
//! out through the worker pool; one failed pod never stops the others.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::cluster::{ClusterClient, ClusterError, PodInfo};
use crate::config::ExecutorConfig;
use crate::nodes::NodeSet;
use crate::pool::{run_pool, ItemOutcome};

/// Grace added on top of the per-node budget before the pool cancels a node.
const POOL_GRACE: Duration = Duration::from_secs(5);

/// What happened to one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum PodOutcome {
    Deleted,
    Failed(String),
    /// The node's time budget ran out before this pod was handled.
    TimedOut,
}

impl PodOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// One row of the restart report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodRestart {
    pub node: String,
    pub namespace: String,
    pub pod: String,
    pub outcome: PodOutcome,
}

/// Per-pod restart results, ordered by node then pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestartReport {
    pub entries: Vec<PodRestart>,
    /// Affected nodes where no pod matched the pattern.
    pub nodes_without_pods: NodeSet,
}

impl RestartReport {
    /// True if any pod could not be restarted.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.entries.iter().any(|entry| !entry.outcome.is_success())
    }

    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_success())
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.deleted_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pods selected for restart, grouped by node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestartTargets {
    pub pods_by_node: BTreeMap<String, Vec<PodInfo>>,
    pub nodes_without_pods: NodeSet,
}

impl RestartTargets {
    /// All selected pods, ordered by node then pod.
    #[must_use]
    pub fn pods(&self) -> Vec<&PodInfo> {
        self.pods_by_node.values().flatten().collect()
    }
}

/// Deletes matching pods on the affected nodes.
pub struct RestartCoordinator<'a> {
    cluster: &'a dyn ClusterClient,
    workers: usize,
    node_timeout: Duration,
}

impl<'a> RestartCoordinator<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterClient, config: &ExecutorConfig) -> Self {
        Self {
            cluster,
            workers: config.restart_workers,
            node_timeout: config.restart_timeout,
        }
    }

    /// Find the pods a restart would delete, without deleting anything.
    ///
    /// An empty node set returns immediately without listing pods.
    ///
    /// # Errors
    ///
    /// Returns cluster errors from listing pods.
    pub async fn targets(
        &self,
        nodes: &NodeSet,
        pod_pattern: &str,
    ) -> Result<RestartTargets, ClusterError> {
        if nodes.is_empty() {
            return Ok(RestartTargets::default());
        }

        let pods = self.cluster.list_pods().await?;
        let mut pods_by_node: BTreeMap<String, Vec<PodInfo>> = BTreeMap::new();
        for pod in pods {
            if pod_pattern.is_empty() || !pod.name.contains(pod_pattern) {
                continue;
            }
            let Some(node) = pod.node.clone() else {
                continue;
            };
            if nodes.contains(&node) {
                pods_by_node.entry(node).or_default().push(pod);
            }
        }
        for pods in pods_by_node.values_mut() {
            pods.sort();
        }

        let nodes_without_pods = nodes
            .iter()
            .filter(|node| !pods_by_node.contains_key(*node))
            .collect();

        Ok(RestartTargets {
            pods_by_node,
            nodes_without_pods,
        })
    }

    /// Delete every pod matching `pod_pattern` on `nodes`.
    ///
    /// # Errors
    ///
    /// Returns cluster errors from listing pods. Deletion failures are
    /// recorded in the report instead.
    pub async fn restart(
        &self,
        nodes: &NodeSet,
        pod_pattern: &str,
    ) -> Result<RestartReport, ClusterError> {
        let targets = self.targets(nodes, pod_pattern).await?;
        if !targets.nodes_without_pods.is_empty() {
            warn!(
                nodes = %targets.nodes_without_pods,
                pattern = pod_pattern,
                "No matching pods on some affected nodes"
            );
        }

        let work: Vec<(String, Vec<PodInfo>)> = targets.pods_by_node.into_iter().collect();
        info!(
            nodes = work.len(),
            workers = self.workers,
            "Restarting pods"
        );

        let node_timeout = self.node_timeout;
        let results = run_pool(
            work,
            self.workers,
            node_timeout + POOL_GRACE,
            |(node, pods)| async move { self.restart_node(&node, &pods, node_timeout).await },
        )
        .await;

        let mut entries = Vec::new();
        for result in results {
            let (node, pods) = result.item;
            match result.outcome {
                ItemOutcome::Completed(outcomes) => {
                    entries.extend(pods.into_iter().zip(outcomes).map(|(pod, outcome)| {
                        PodRestart {
                            node: node.clone(),
                            namespace: pod.namespace,
                            pod: pod.name,
                            outcome,
                        }
                    }));
                }
                ItemOutcome::TimedOut => {
                    entries.extend(pods.into_iter().map(|pod| PodRestart {
                        node: node.clone(),
                        namespace: pod.namespace,
                        pod: pod.name,
                        outcome: PodOutcome::TimedOut,
                    }));
                }
            }
        }

        let report = RestartReport {
            entries,
            nodes_without_pods: targets.nodes_without_pods,
        };
        info!(
            deleted = report.deleted_count(),
            failed = report.failed_count(),
            "Pod restarts finished"
        );
        Ok(report)
    }

    /// Delete the pods of one node in order, within the node's time budget.
    async fn restart_node(&self, node: &str, pods: &[PodInfo], budget: Duration) -> Vec<PodOutcome> {
        let deadline = Instant::now() + budget;
        let mut outcomes = Vec::with_capacity(pods.len());
        for pod in pods {
            if Instant::now() >= deadline {
                outcomes.push(PodOutcome::TimedOut);
                continue;
            }
            let outcome = match timeout_at(deadline, self.cluster.delete_pod(&pod.namespace, &pod.name)).await {
                Ok(Ok(())) => {
                    info!(node, pod = %pod.name, "Deleted pod");
                    PodOutcome::Deleted
                }
                Ok(Err(e)) => {
                    warn!(node, pod = %pod.name, error = %e, "Failed to delete pod");
                    PodOutcome::Failed(e.to_string())
                }
                Err(_) => {
                    warn!(node, pod = %pod.name, "Pod deletion timed out");
                    PodOutcome::TimedOut
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
