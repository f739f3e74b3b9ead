//! Target node resolution.
//!
//! Exactly one strategy decides the node set, in fixed precedence: an
//! explicit list, then all nodes, then nodes hosting pods that match a name
//! pattern.

use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, PodInfo};
use crate::config::SelectionInput;
use crate::error::{Error, Result};
use crate::nodes::NodeSet;

/// The strategy that produced a node set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    ExplicitList,
    AllNodes,
    PodPattern,
}

impl SelectionStrategy {
    /// The strategy that wins for `input`.
    #[must_use]
    pub fn for_input(input: &SelectionInput) -> Self {
        if !input.nodes.is_empty() {
            Self::ExplicitList
        } else if input.all_nodes {
            Self::AllNodes
        } else {
            Self::PodPattern
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExplicitList => write!(f, "explicit node list"),
            Self::AllNodes => write!(f, "all nodes"),
            Self::PodPattern => write!(f, "pod name pattern"),
        }
    }
}

/// Names of nodes hosting at least one pod whose name contains `pattern`.
///
/// An empty pattern matches nothing.
#[must_use]
pub fn nodes_running(pods: &[PodInfo], pattern: &str) -> NodeSet {
    if pattern.is_empty() {
        return NodeSet::new();
    }
    pods.iter()
        .filter(|pod| pod.name.contains(pattern))
        .filter_map(|pod| pod.node.clone())
        .collect()
}

/// Pure node selection over already-listed cluster state.
///
/// `live_nodes` is only consulted for the all-nodes strategy and for
/// warning about unknown explicit names; `live_pods` only for the pattern.
///
/// # Errors
///
/// Returns [`Error::Selection`] if the result is empty and `required`.
pub fn select(
    input: &SelectionInput,
    live_nodes: Option<&[String]>,
    live_pods: Option<&[PodInfo]>,
    required: bool,
) -> Result<NodeSet> {
    let strategy = SelectionStrategy::for_input(input);
    let selected = match strategy {
        SelectionStrategy::ExplicitList => {
            let nodes = NodeSet::from_names(&input.nodes)?;
            if let Some(live) = live_nodes {
                let known: NodeSet = live.iter().cloned().collect();
                let unknown = nodes.difference(&known);
                if !unknown.is_empty() {
                    warn!(nodes = %unknown, "Explicit nodes not found in the cluster; targeting them anyway");
                }
            }
            nodes
        }
        SelectionStrategy::AllNodes => live_nodes.unwrap_or_default().iter().cloned().collect(),
        SelectionStrategy::PodPattern => {
            nodes_running(live_pods.unwrap_or_default(), &input.pod_pattern)
        }
    };

    info!(strategy = %strategy, count = selected.len(), "Resolved target nodes");

    if selected.is_empty() && required {
        let reason = match strategy {
            SelectionStrategy::ExplicitList => "the node list is empty".to_string(),
            SelectionStrategy::AllNodes => "the cluster reports no nodes".to_string(),
            SelectionStrategy::PodPattern if input.pod_pattern.is_empty() => {
                "filtering by pods is enabled but the pod pattern is empty".to_string()
            }
            SelectionStrategy::PodPattern => format!(
                "no scheduled pods match the pattern '{}'",
                input.pod_pattern
            ),
        };
        return Err(Error::Selection(reason));
    }
    Ok(selected)
}

/// Resolve the node set against a live cluster, listing only what the
/// winning strategy needs.
///
/// # Errors
///
/// Returns cluster errors, or [`Error::Selection`] as for [`select`].
pub async fn resolve(
    input: &SelectionInput,
    cluster: &dyn ClusterClient,
    required: bool,
) -> Result<NodeSet> {
    match SelectionStrategy::for_input(input) {
        SelectionStrategy::ExplicitList => select(input, None, None, required),
        SelectionStrategy::AllNodes => {
            let nodes = cluster.list_nodes().await?;
            select(input, Some(nodes.as_slice()), None, required)
        }
        SelectionStrategy::PodPattern => {
            let pods = cluster.list_pods().await?;
            select(input, None, Some(pods.as_slice()), required)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(nodes: &[&str], all_nodes: bool, pattern: &str) -> SelectionInput {
        SelectionInput {
            nodes: nodes.iter().map(ToString::to_string).collect(),
            all_nodes,
            pod_pattern: pattern.to_string(),
        }
    }

    fn live_nodes() -> Vec<String> {
        vec!["x".into(), "y".into(), "z".into()]
    }

    #[test]
    fn test_explicit_list_beats_all_nodes() {
        let nodes = live_nodes();
        let set = select(&input(&["x", "y"], true, ""), Some(nodes.as_slice()), None, true).unwrap();
        assert_eq!(set, ["x", "y"].into_iter().collect::<NodeSet>());
    }

    #[test]
    fn test_explicit_list_not_validated_against_cluster() {
        let nodes = live_nodes();
        let set = select(&input(&["absent"], false, ""), Some(nodes.as_slice()), None, true).unwrap();
        assert!(set.contains("absent"));
    }

    #[test]
    fn test_all_nodes() {
        let nodes = live_nodes();
        let set = select(&input(&[], true, "ignored"), Some(nodes.as_slice()), None, true).unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_pod_pattern_is_case_sensitive_substring() {
        let pods = vec![
            PodInfo::new("ovn", "ovnkube-node-abcde", Some("n1")),
            PodInfo::new("ovn", "ovnkube-node-fghij", Some("n2")),
            PodInfo::new("ovn", "ovnkube-node-klmno", Some("n2")),
            PodInfo::new("ovn", "OVNKUBE-NODE-upper", Some("n3")),
            PodInfo::new("ovn", "ovnkube-node-pending", None),
            PodInfo::new("other", "web-1", Some("n4")),
        ];
        let set = select(&input(&[], false, "kube-node"), None, Some(pods.as_slice()), true).unwrap();
        assert_eq!(set, ["n1", "n2"].into_iter().collect::<NodeSet>());
    }

    #[test]
    fn test_empty_selection_required() {
        let pods = vec![PodInfo::new("ns", "web", Some("n1"))];
        let err = select(&input(&[], false, "ovnkube"), None, Some(pods.as_slice()), true).unwrap_err();
        assert!(matches!(err, Error::Selection(_)));

        let err = select(&input(&[], false, ""), None, Some(pods.as_slice()), true).unwrap_err();
        assert!(err.to_string().contains("pod pattern is empty"));
    }

    #[test]
    fn test_empty_selection_tolerated_when_optional() {
        let set = select(&input(&[], false, "nothing"), None, Some(&[][..]), false).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_malformed_explicit_list() {
        let err = select(&input(&["ok", " "], false, ""), None, None, true).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
