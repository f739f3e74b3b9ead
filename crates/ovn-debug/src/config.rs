//! Operation configuration types.
//!
//! Log level value types, selection input and the tunables that govern
//! retries, timeouts and fan-out.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default namespace holding the override ConfigMap.
pub const DEFAULT_NAMESPACE: &str = "openshift-ovn-kubernetes";

/// Default name of the override ConfigMap.
pub const DEFAULT_CONFIG_MAP: &str = "env-overrides";

/// Default pod name pattern used for node discovery and restarts.
pub const DEFAULT_POD_PATTERN: &str = "ovnkube-node";

/// OVN-Kubernetes process log level (`OVN_KUBE_LOG_LEVEL`), 1 through 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct KubeLogLevel(u8);

impl KubeLogLevel {
    /// Lowest accepted level.
    pub const MIN: u8 = 1;
    /// Highest accepted level.
    pub const MAX: u8 = 10;

    /// Validate and wrap a level.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the level is outside 1..=10.
    pub fn new(level: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(Error::config(format!(
                "OVN_KUBE_LOG_LEVEL must be between {} and {}, got {level}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for KubeLogLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for KubeLogLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<KubeLogLevel> for u8 {
    fn from(level: KubeLogLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for KubeLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for KubeLogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("Invalid OVN_KUBE_LOG_LEVEL: {s}")))?;
        Self::new(level)
    }
}

/// OVN daemon log level (`OVN_LOG_LEVEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OvnLogLevel {
    Off,
    Emer,
    Err,
    Warn,
    Info,
    #[default]
    Dbg,
}

impl OvnLogLevel {
    /// All levels, quietest first.
    pub const ALL: [Self; 6] = [
        Self::Off,
        Self::Emer,
        Self::Err,
        Self::Warn,
        Self::Info,
        Self::Dbg,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Emer => "emer",
            Self::Err => "err",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Dbg => "dbg",
        }
    }
}

impl std::fmt::Display for OvnLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OvnLogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s.trim())
            .ok_or_else(|| {
                Error::config(format!(
                    "Unknown OVN_LOG_LEVEL: {s}. Supported: off, emer, err, warn, info, dbg"
                ))
            })
    }
}

/// Both log levels written into an override entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogLevels {
    pub kube: KubeLogLevel,
    pub ovn: OvnLogLevel,
}

impl LogLevels {
    #[must_use]
    pub fn new(kube: KubeLogLevel, ovn: OvnLogLevel) -> Self {
        Self { kube, ovn }
    }

    /// Recover the levels from a stored override entry.
    ///
    /// Comment lines and unknown keys are ignored. Returns `None` when either
    /// variable is missing or unparseable.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut kube = None;
        let mut ovn = None;
        for line in text.lines().map(str::trim) {
            if line.starts_with('#') {
                continue;
            }
            if let Some(value) = line.strip_prefix("OVN_KUBE_LOG_LEVEL=") {
                kube = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("OVN_LOG_LEVEL=") {
                ovn = value.parse().ok();
            }
        }
        Some(Self {
            kube: kube?,
            ovn: ovn?,
        })
    }
}

/// How the target node set is chosen for an apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionInput {
    /// Explicit node names; wins over everything else when non-empty.
    pub nodes: Vec<String>,
    /// Target every node in the cluster.
    pub all_nodes: bool,
    /// Substring matched against pod names to find hosting nodes.
    pub pod_pattern: String,
}

impl SelectionInput {
    /// Selection by the default pod pattern.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            nodes: Vec::new(),
            all_nodes: false,
            pod_pattern: DEFAULT_POD_PATTERN.into(),
        }
    }
}

/// Location of the override document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub namespace: String,
    pub name: String,
}

impl Default for DocumentLocation {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            name: DEFAULT_CONFIG_MAP.into(),
        }
    }
}

impl std::fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Tunables for conflict handling and restart fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Re-read-and-reapply attempts after a write conflict.
    pub conflict_retries: u32,
    /// Time budget for restarting the pods of a single node.
    pub restart_timeout: Duration,
    /// Number of nodes restarted concurrently.
    pub restart_workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 1,
            restart_timeout: Duration::from_secs(300),
            restart_workers: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kube_level_bounds() {
        assert!(KubeLogLevel::new(0).is_err());
        assert_eq!(KubeLogLevel::new(1).unwrap().get(), 1);
        assert_eq!(KubeLogLevel::new(10).unwrap().get(), 10);
        assert!(matches!(
            KubeLogLevel::new(11),
            Err(Error::Configuration(_))
        ));
        assert!("abc".parse::<KubeLogLevel>().is_err());
        assert_eq!("7".parse::<KubeLogLevel>().unwrap().get(), 7);
    }

    #[test]
    fn test_ovn_level_parsing() {
        for level in OvnLogLevel::ALL {
            assert_eq!(level.as_str().parse::<OvnLogLevel>().unwrap(), level);
        }
        assert!("debug".parse::<OvnLogLevel>().is_err());
        assert!("DBG".parse::<OvnLogLevel>().is_err());
    }

    #[test]
    fn test_parse_levels_from_entry() {
        let text = "# comment\nOVN_KUBE_LOG_LEVEL=4\n# another\nOVN_LOG_LEVEL=info\n";
        let levels = LogLevels::parse(text).unwrap();
        assert_eq!(levels.kube.get(), 4);
        assert_eq!(levels.ovn, OvnLogLevel::Info);

        assert!(LogLevels::parse("OVN_LOG_LEVEL=info").is_none());
        assert!(LogLevels::parse("OVN_KUBE_LOG_LEVEL=42\nOVN_LOG_LEVEL=info").is_none());
    }

    #[test]
    fn test_defaults() {
        let levels = LogLevels::default();
        assert_eq!(levels.kube.get(), 5);
        assert_eq!(levels.ovn, OvnLogLevel::Dbg);

        let location = DocumentLocation::default();
        assert_eq!(location.to_string(), "openshift-ovn-kubernetes/env-overrides");

        let config = ExecutorConfig::default();
        assert_eq!(config.conflict_retries, 1);
        assert_eq!(config.restart_timeout, Duration::from_secs(300));
    }
}
