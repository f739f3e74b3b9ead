//! OVN-Kubernetes debug logging toggle.
//!
//! This library manages the `env-overrides` ConfigMap that OVN-Kubernetes
//! reads per-node log levels from, restarts the affected pods, and drives
//! RETIS packet capture on debug-enabled nodes.
//!
//! # Example
//!
//! ```ignore
//! use ovn_debug::{ExecutorConfig, LogLevels, MemoryCluster, OperationExecutor, OperationRequest, SelectionInput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cluster = MemoryCluster::new().with_namespace("openshift-ovn-kubernetes");
//!     let selection = SelectionInput {
//!         nodes: vec!["worker-1".into()],
//!         ..SelectionInput::with_defaults()
//!     };
//!     let request = OperationRequest::apply(LogLevels::default(), selection);
//!     let summary = OperationExecutor::new(&cluster, ExecutorConfig::default())
//!         .run(&request)
//!         .await?;
//!     println!("{:?}", summary.mutation);
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod cluster;
pub mod collect;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod kubeconfig;
pub mod nodes;
pub mod planner;
pub mod pool;
pub mod report;
pub mod restart;
pub mod selector;
pub mod store;
pub mod ui;

// Re-export commonly used types at the crate root
pub use cluster::{ClusterClient, ClusterError, KubeCluster, MemoryCluster, PodInfo};
pub use config::{DocumentLocation, ExecutorConfig, KubeLogLevel, LogLevels, OvnLogLevel, SelectionInput};
pub use document::{OverrideBlock, OverrideDocument};
pub use error::{Error, Result};
pub use executor::{MutationOutcome, OperationExecutor, OperationRequest, OperationSummary};
pub use nodes::NodeSet;
pub use planner::{PlanMode, ReconcilePlan};
pub use restart::{RestartCoordinator, RestartReport};
pub use store::OverrideStore;
