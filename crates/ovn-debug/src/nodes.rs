//! Node name sets.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Deduplicated, sorted set of node names targeted by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSet(BTreeSet<String>);

impl NodeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        self.0.contains(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Nodes in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).cloned().collect()
    }

    /// Parse a comma-separated `--nodes` value.
    ///
    /// Entries are trimmed; empty entries and names that are not valid
    /// Kubernetes object names are rejected.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed lists.
    pub fn parse_list(raw: &str) -> Result<Self> {
        raw.split(',').map(parse_node_name).collect()
    }

    /// Validate a list of already-split node names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any name is malformed.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| parse_node_name(name.as_ref()))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for NodeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for NodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

fn node_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // DNS-1123 subdomain.
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .unwrap_or_else(|e| unreachable!("node name regex is valid: {e}"))
    })
}

fn parse_node_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::config("Node list contains an empty entry"));
    }
    if name.len() > 253 || !node_name_regex().is_match(name) {
        return Err(Error::config(format!("Invalid node name: '{name}'")));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_dedups_and_sorts() {
        let set = NodeSet::parse_list("worker-2, worker-1,worker-2").unwrap();
        assert_eq!(set.len(), 2);
        let names: Vec<&str> = set.iter().collect();
        assert_eq!(names, vec!["worker-1", "worker-2"]);
    }

    #[test]
    fn test_parse_list_rejects_malformed() {
        assert!(matches!(
            NodeSet::parse_list("worker-1,,worker-2"),
            Err(Error::Configuration(_))
        ));
        assert!(NodeSet::parse_list("Worker_1").is_err());
        assert!(NodeSet::parse_list("-leading").is_err());
        assert!(NodeSet::parse_list("").is_err());
    }

    #[test]
    fn test_fqdn_node_names_are_valid() {
        let set = NodeSet::from_names(["ip-10-0-1-5.ec2.internal"]).unwrap();
        assert!(set.contains("ip-10-0-1-5.ec2.internal"));
    }

    #[test]
    fn test_display() {
        let set: NodeSet = ["b", "a"].into_iter().collect();
        assert_eq!(set.to_string(), "{a, b}");
    }
}
