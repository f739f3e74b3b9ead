//! The override document and its merge semantics.
//!
//! OVN-Kubernetes reads per-node environment overrides from a single
//! ConfigMap. Each key is a node name, except [`AGGREGATE_KEY`] which applies
//! to the control-plane (master) processes. Values are small env files.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::config::{DocumentLocation, LogLevels};
use crate::nodes::NodeSet;

/// Reserved key carrying the control-plane override.
pub const AGGREGATE_KEY: &str = "_master";

/// Which processes an override block targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// `ovnkube-node` and `ovn-controller` on one node.
    Worker,
    /// `ovnkube-master`, `ovn-dbchecker`, northd and the databases.
    Aggregate,
}

impl Role {
    /// Comment lines preceding the two variables.
    fn comments(self) -> (&'static str, &'static str) {
        match self {
            Self::Worker => (
                "# This sets the log level for the ovn-kubernetes node process:",
                "# You might also/instead want to enable debug logging for ovn-controller:",
            ),
            Self::Aggregate => (
                "# This sets the log level for the ovn-kubernetes master process as well as the ovn-dbchecker:",
                "# You might also/instead want to enable debug logging for northd, nbdb and sbdb on all masters:",
            ),
        }
    }
}

/// One entry of the override document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideBlock {
    pub role: Role,
    pub levels: LogLevels,
}

impl OverrideBlock {
    #[must_use]
    pub fn worker(levels: LogLevels) -> Self {
        Self {
            role: Role::Worker,
            levels,
        }
    }

    #[must_use]
    pub fn aggregate(levels: LogLevels) -> Self {
        Self {
            role: Role::Aggregate,
            levels,
        }
    }

    /// Render the env-file text stored in the ConfigMap.
    #[must_use]
    pub fn render(&self) -> String {
        let (kube_comment, ovn_comment) = self.role.comments();
        let lines = [
            kube_comment.to_string(),
            format!("OVN_KUBE_LOG_LEVEL={}", self.levels.kube),
            ovn_comment.to_string(),
            format!("OVN_LOG_LEVEL={}", self.levels.ovn),
        ];
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// The persisted override ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDocument {
    pub namespace: String,
    pub name: String,
    /// Node key to rendered override text. Unknown keys are kept verbatim.
    pub entries: BTreeMap<String, String>,
    /// Concurrency token; `None` until the document has been stored.
    pub resource_version: Option<String>,
}

impl OverrideDocument {
    /// An empty, never-stored document.
    #[must_use]
    pub fn empty(location: &DocumentLocation) -> Self {
        Self {
            namespace: location.namespace.clone(),
            name: location.name.clone(),
            entries: BTreeMap::new(),
            resource_version: None,
        }
    }

    /// Merge `block` for every node in `nodes` into `existing`.
    ///
    /// Targeted nodes are overwritten unconditionally, the aggregate entry is
    /// always refreshed, and every other entry is carried over untouched.
    /// The resource version of `existing` is preserved so the write is
    /// conditioned on the state the merge was computed from.
    #[must_use]
    pub fn merge(
        existing: Option<&Self>,
        location: &DocumentLocation,
        nodes: &NodeSet,
        block: &OverrideBlock,
        aggregate: &OverrideBlock,
    ) -> Self {
        let mut merged = existing.cloned().unwrap_or_else(|| Self::empty(location));
        let rendered = block.render();
        for node in nodes {
            merged.entries.insert(node.clone(), rendered.clone());
        }
        merged
            .entries
            .insert(AGGREGATE_KEY.to_string(), aggregate.render());
        merged
    }

    /// Worker node keys, excluding the aggregate entry.
    #[must_use]
    pub fn extract_nodes(&self) -> NodeSet {
        self.entries
            .keys()
            .filter(|key| key.as_str() != AGGREGATE_KEY)
            .cloned()
            .collect()
    }

    /// Levels currently configured for each entry, where parseable.
    #[must_use]
    pub fn levels(&self) -> BTreeMap<&str, Option<LogLevels>> {
        self.entries
            .iter()
            .map(|(key, text)| (key.as_str(), LogLevels::parse(text)))
            .collect()
    }

    /// Entries that differ between `self` and `other`.
    #[must_use]
    pub fn changed_keys(&self, other: Option<&Self>) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, text)| {
                other.and_then(|o| o.entries.get(key.as_str())) != Some(*text)
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Kubernetes representation, used for previews.
    #[must_use]
    pub fn to_config_map(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: self.resource_version.clone(),
                ..ObjectMeta::default()
            },
            data: Some(self.entries.clone()),
            ..ConfigMap::default()
        }
    }

    /// Render the ConfigMap as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_config_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KubeLogLevel, OvnLogLevel};

    fn levels(kube: u8, ovn: OvnLogLevel) -> LogLevels {
        LogLevels::new(KubeLogLevel::new(kube).unwrap(), ovn)
    }

    fn nodes(names: &[&str]) -> NodeSet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_render_worker_block() {
        let block = OverrideBlock::worker(levels(3, OvnLogLevel::Warn));
        assert_eq!(
            block.render(),
            "# This sets the log level for the ovn-kubernetes node process:\n\
             OVN_KUBE_LOG_LEVEL=3\n\
             # You might also/instead want to enable debug logging for ovn-controller:\n\
             OVN_LOG_LEVEL=warn\n"
        );
    }

    #[test]
    fn test_roles_render_differently() {
        let l = levels(5, OvnLogLevel::Dbg);
        assert_ne!(OverrideBlock::worker(l), OverrideBlock::aggregate(l));
        assert_ne!(
            OverrideBlock::worker(l).render(),
            OverrideBlock::aggregate(l).render()
        );
        assert_eq!(LogLevels::parse(&OverrideBlock::aggregate(l).render()), Some(l));
    }

    #[test]
    fn test_merge_into_nothing() {
        let location = DocumentLocation::default();
        let l = levels(3, OvnLogLevel::Warn);
        let doc = OverrideDocument::merge(
            None,
            &location,
            &nodes(&["worker-1", "worker-2"]),
            &OverrideBlock::worker(l),
            &OverrideBlock::aggregate(l),
        );
        assert_eq!(doc.entries.len(), 3);
        assert!(doc.entries.contains_key(AGGREGATE_KEY));
        assert!(doc.resource_version.is_none());
        for text in doc.entries.values() {
            assert!(text.contains("OVN_KUBE_LOG_LEVEL=3\n"));
            assert!(text.contains("OVN_LOG_LEVEL=warn\n"));
        }
    }

    #[test]
    fn test_merge_preserves_untouched_entries() {
        let location = DocumentLocation::default();
        let mut existing = OverrideDocument::empty(&location);
        existing.entries.insert("a".into(), "OVN_LOG_LEVEL=info\n".into());
        existing.entries.insert("b".into(), "custom text".into());
        existing.entries.insert(AGGREGATE_KEY.into(), "stale".into());
        existing.resource_version = Some("42".into());

        let l = levels(7, OvnLogLevel::Dbg);
        let merged = OverrideDocument::merge(
            Some(&existing),
            &location,
            &nodes(&["c"]),
            &OverrideBlock::worker(l),
            &OverrideBlock::aggregate(l),
        );

        assert_eq!(merged.entries["a"], "OVN_LOG_LEVEL=info\n");
        assert_eq!(merged.entries["b"], "custom text");
        assert_eq!(merged.entries["c"], OverrideBlock::worker(l).render());
        assert_eq!(
            merged.entries[AGGREGATE_KEY],
            OverrideBlock::aggregate(l).render()
        );
        assert_eq!(merged.resource_version.as_deref(), Some("42"));
        assert_eq!(merged.changed_keys(Some(&existing)), vec![AGGREGATE_KEY, "c"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let location = DocumentLocation::default();
        let l = levels(4, OvnLogLevel::Info);
        let set = nodes(&["n1", "n2"]);
        let once = OverrideDocument::merge(
            None,
            &location,
            &set,
            &OverrideBlock::worker(l),
            &OverrideBlock::aggregate(l),
        );
        let twice = OverrideDocument::merge(
            Some(&once),
            &location,
            &set,
            &OverrideBlock::worker(l),
            &OverrideBlock::aggregate(l),
        );
        assert_eq!(once, twice);
        assert!(twice.changed_keys(Some(&once)).is_empty());
    }

    #[test]
    fn test_extract_nodes_skips_aggregate() {
        let mut doc = OverrideDocument::empty(&DocumentLocation::default());
        doc.entries.insert("worker-1".into(), String::new());
        doc.entries.insert(AGGREGATE_KEY.into(), String::new());
        doc.entries.insert("gone-node".into(), String::new());
        assert_eq!(doc.extract_nodes(), nodes(&["gone-node", "worker-1"]));
    }

    #[test]
    fn test_yaml_preview() {
        let l = levels(5, OvnLogLevel::Dbg);
        let doc = OverrideDocument::merge(
            None,
            &DocumentLocation::default(),
            &nodes(&["worker-1"]),
            &OverrideBlock::worker(l),
            &OverrideBlock::aggregate(l),
        );
        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("name: env-overrides"));
        assert!(yaml.contains("namespace: openshift-ovn-kubernetes"));
        assert!(yaml.contains("worker-1"));
        assert!(yaml.contains("_master"));
    }
}
