//! Reconcile planning: what to write or delete, and which nodes it affects.
//!
//! Planning is pure. It never talks to the cluster; callers pass in the
//! document they just read.

use serde::Serialize;
use tracing::debug;

use crate::config::{DocumentLocation, LogLevels};
use crate::document::{OverrideBlock, OverrideDocument};
use crate::error::{Error, Result};
use crate::nodes::NodeSet;

/// Whether debug logging is being enabled or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Apply,
    Revert,
}

impl std::fmt::Display for PlanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Revert => write!(f, "revert"),
        }
    }
}

/// The concrete change an operation will make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub mode: PlanMode,
    /// Document state the plan was computed from.
    pub current: Option<OverrideDocument>,
    /// Merged document to store (apply only).
    pub to_write: Option<OverrideDocument>,
    /// Whether the document should be removed (revert only).
    pub delete_document: bool,
    /// Nodes whose OVN pods pick up the change.
    pub affected_nodes: NodeSet,
    /// Control-plane nodes covered by the aggregate entry instead of their own.
    pub skipped_control_plane: NodeSet,
}

impl ReconcilePlan {
    /// True when executing the plan would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self.mode {
            PlanMode::Apply => self
                .to_write
                .as_ref()
                .map_or(true, |doc| Some(doc) == self.current.as_ref()),
            PlanMode::Revert => !self.delete_document,
        }
    }

    /// Entry keys the write would add or change.
    #[must_use]
    pub fn changed_keys(&self) -> Vec<&str> {
        self.to_write
            .as_ref()
            .map(|doc| doc.changed_keys(self.current.as_ref()))
            .unwrap_or_default()
    }

    /// Resource version a delete should be conditioned on.
    #[must_use]
    pub fn base_version(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|doc| doc.resource_version.as_deref())
    }
}

/// Whether a node name denotes a control-plane node.
///
/// Those nodes run the master processes configured by the aggregate entry.
#[must_use]
pub fn is_control_plane_name(node: &str) -> bool {
    node.to_lowercase().contains("master")
}

/// Plan enabling `levels` on `nodes`.
///
/// # Errors
///
/// Returns [`Error::Selection`] if `nodes` is empty.
pub fn plan_apply(
    current: Option<OverrideDocument>,
    location: &DocumentLocation,
    nodes: &NodeSet,
    levels: LogLevels,
) -> Result<ReconcilePlan> {
    if nodes.is_empty() {
        return Err(Error::Selection(
            "apply requires at least one target node".into(),
        ));
    }

    let (skipped_control_plane, workers): (Vec<&str>, Vec<&str>) =
        nodes.iter().partition(|node| is_control_plane_name(node));
    let workers: NodeSet = workers.into_iter().collect();

    let to_write = OverrideDocument::merge(
        current.as_ref(),
        location,
        &workers,
        &OverrideBlock::worker(levels),
        &OverrideBlock::aggregate(levels),
    );

    let plan = ReconcilePlan {
        mode: PlanMode::Apply,
        current,
        to_write: Some(to_write),
        delete_document: false,
        affected_nodes: nodes.clone(),
        skipped_control_plane: skipped_control_plane.into_iter().collect(),
    };
    debug!(
        affected = %plan.affected_nodes,
        changed = ?plan.changed_keys(),
        "Planned apply"
    );
    Ok(plan)
}

/// Plan removing the document. Target nodes come from the document itself.
#[must_use]
pub fn plan_revert(current: Option<OverrideDocument>) -> ReconcilePlan {
    let (affected_nodes, delete_document) = match &current {
        Some(doc) => (doc.extract_nodes(), true),
        None => (NodeSet::new(), false),
    };
    debug!(affected = %affected_nodes, delete_document, "Planned revert");
    ReconcilePlan {
        mode: PlanMode::Revert,
        current,
        to_write: None,
        delete_document,
        affected_nodes,
        skipped_control_plane: NodeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KubeLogLevel, OvnLogLevel};
    use crate::document::AGGREGATE_KEY;

    fn levels() -> LogLevels {
        LogLevels::new(KubeLogLevel::new(3).unwrap(), OvnLogLevel::Warn)
    }

    #[test]
    fn test_apply_requires_nodes() {
        let err = plan_apply(None, &DocumentLocation::default(), &NodeSet::new(), levels())
            .unwrap_err();
        assert!(matches!(err, Error::Selection(_)));
    }

    #[test]
    fn test_apply_from_empty() {
        let nodes: NodeSet = ["worker-1", "worker-2"].into_iter().collect();
        let plan = plan_apply(None, &DocumentLocation::default(), &nodes, levels()).unwrap();
        assert_eq!(plan.mode, PlanMode::Apply);
        assert!(!plan.delete_document);
        assert_eq!(plan.affected_nodes, nodes);
        let doc = plan.to_write.as_ref().unwrap();
        assert_eq!(doc.entries.len(), 3);
        assert!(!plan.is_noop());
        assert_eq!(plan.changed_keys(), vec![AGGREGATE_KEY, "worker-1", "worker-2"]);
    }

    #[test]
    fn test_apply_routes_masters_to_aggregate() {
        let nodes: NodeSet = ["Master-0", "worker-1"].into_iter().collect();
        let plan = plan_apply(None, &DocumentLocation::default(), &nodes, levels()).unwrap();
        let doc = plan.to_write.as_ref().unwrap();
        assert!(!doc.entries.contains_key("Master-0"));
        assert!(doc.entries.contains_key("worker-1"));
        assert!(plan.affected_nodes.contains("Master-0"));
        assert!(plan.skipped_control_plane.contains("Master-0"));
    }

    #[test]
    fn test_reapply_is_noop() {
        let location = DocumentLocation::default();
        let nodes: NodeSet = ["worker-1"].into_iter().collect();
        let first = plan_apply(None, &location, &nodes, levels()).unwrap();
        let stored = first.to_write.unwrap();
        let second = plan_apply(Some(stored), &location, &nodes, levels()).unwrap();
        assert!(second.is_noop());
        assert!(second.changed_keys().is_empty());
    }

    #[test]
    fn test_revert_absent_is_noop() {
        let plan = plan_revert(None);
        assert_eq!(plan.mode, PlanMode::Revert);
        assert!(!plan.delete_document);
        assert!(plan.affected_nodes.is_empty());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_revert_sources_nodes_from_document() {
        let mut doc = OverrideDocument::empty(&DocumentLocation::default());
        doc.entries.insert("n1".into(), String::new());
        doc.entries.insert("n2".into(), String::new());
        doc.entries.insert(AGGREGATE_KEY.into(), String::new());
        doc.resource_version = Some("7".into());

        let plan = plan_revert(Some(doc));
        assert!(plan.delete_document);
        assert_eq!(plan.affected_nodes, ["n1", "n2"].into_iter().collect::<NodeSet>());
        assert_eq!(plan.base_version(), Some("7"));
    }
}
