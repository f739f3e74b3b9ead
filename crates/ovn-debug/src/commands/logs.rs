//! Logs command - enable or revert OVN-Kubernetes debug logging.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::GlobalArgs;
use crate::config::{
    DocumentLocation, ExecutorConfig, KubeLogLevel, LogLevels, OvnLogLevel, SelectionInput,
    DEFAULT_CONFIG_MAP, DEFAULT_NAMESPACE, DEFAULT_POD_PATTERN,
};
use crate::executor::{OperationExecutor, OperationRequest, OperationSummary};
use crate::nodes::NodeSet;
use crate::{report, ui};

/// Enable or revert debug logging through the env-overrides ConfigMap.
#[derive(Args, Debug, Clone)]
pub struct LogsCommand {
    /// Comma-separated node names to enable debug logging on.
    #[arg(long, value_name = "NODES")]
    nodes: Option<String>,

    /// Enable debug logging on every node in the cluster.
    #[arg(long)]
    all_nodes: bool,

    /// Pod name substring used to find nodes and pods to restart.
    #[arg(long, default_value = DEFAULT_POD_PATTERN)]
    pod_pattern: String,

    /// Remove the debug ConfigMap instead of creating it.
    #[arg(long)]
    revert: bool,

    /// Show what would change without touching the cluster.
    #[arg(long)]
    dry_run: bool,

    /// Delete the OVN pods on affected nodes so the change takes effect.
    #[arg(long)]
    restart_pods: bool,

    /// OVN_KUBE_LOG_LEVEL value (1-10).
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=10))]
    ovn_kube_log_level: u8,

    /// OVN_LOG_LEVEL value (off, emer, err, warn, info, dbg).
    #[arg(long, default_value = "dbg")]
    ovn_log_level: OvnLogLevel,

    /// Namespace holding the ConfigMap.
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the ConfigMap.
    #[arg(long, default_value = DEFAULT_CONFIG_MAP)]
    config_map: String,

    /// Re-read-and-retry attempts after a concurrent modification.
    #[arg(long, default_value_t = 1)]
    conflict_retries: u32,

    /// Time budget for restarting the pods of one node.
    #[arg(long, default_value_t = 300)]
    restart_timeout_secs: u64,

    /// Number of nodes restarted concurrently.
    #[arg(long, default_value_t = 5)]
    restart_workers: usize,
}

impl LogsCommand {
    /// Build the operation request without contacting the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed node lists, invalid levels or
    /// contradictory flags.
    pub fn request(&self) -> Result<OperationRequest> {
        let nodes: Vec<String> = match &self.nodes {
            Some(raw) => NodeSet::parse_list(raw)?.iter().map(ToString::to_string).collect(),
            None => Vec::new(),
        };
        let selection = SelectionInput {
            nodes,
            all_nodes: self.all_nodes,
            pod_pattern: self.pod_pattern.clone(),
        };
        let location = DocumentLocation {
            namespace: self.namespace.clone(),
            name: self.config_map.clone(),
        };

        let base = if self.revert {
            OperationRequest::revert(selection)
        } else {
            let kube = KubeLogLevel::new(self.ovn_kube_log_level)?;
            OperationRequest::apply(LogLevels::new(kube, self.ovn_log_level), selection)
        };
        let request = base
            .with_location(location)
            .with_dry_run(self.dry_run)
            .with_restart(self.restart_pods);

        request.validate()?;
        Ok(request)
    }

    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            conflict_retries: self.conflict_retries,
            restart_timeout: Duration::from_secs(self.restart_timeout_secs),
            restart_workers: self.restart_workers.max(1),
        }
    }

    /// Run the logs command.
    ///
    /// # Errors
    ///
    /// Returns an error if planning or executing fails. A partial pod
    /// restart is reported but is not an error.
    pub async fn run(&self, global: &GlobalArgs) -> Result<()> {
        let request = self.request()?;
        let human = !global.json;

        if human {
            ui::print_section(if self.revert {
                "Reverting OVN-Kubernetes Debug Logging"
            } else {
                "Enabling OVN-Kubernetes Debug Logging"
            });
            if self.dry_run {
                ui::print_dry_run("No changes will be made");
            }
        }

        let (cluster, _) = global.connect().await?;
        info!(mode = %request.plan_mode(), location = %request.location, "Running operation");

        let executor = OperationExecutor::new(&cluster, self.executor_config());
        let summary = executor
            .run(&request)
            .await
            .with_context(|| format!("Failed to {} debug logging", request.plan_mode()))?;

        if human && (global.debug || self.dry_run) {
            print_document_preview(&summary)?;
        }

        if global.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            report::print_operation_summary(&summary);
            if !summary.dry_run && !self.restart_pods && !summary.plan.affected_nodes.is_empty() {
                ui::print_info(&format!(
                    "Changes apply once the '{}' pods restart; rerun with --restart-pods to do it now",
                    request.restart_pattern()
                ));
            }
        }
        Ok(())
    }
}

/// Print the ConfigMap the operation wrote or would write (or delete).
fn print_document_preview(summary: &OperationSummary) -> Result<()> {
    let (label, document) = match (&summary.plan.to_write, &summary.plan.current) {
        (Some(doc), _) => ("ConfigMap", doc),
        (None, Some(doc)) if summary.plan.delete_document => ("ConfigMap to delete", doc),
        _ => return Ok(()),
    };
    let yaml = document.to_yaml().context("Failed to render ConfigMap as YAML")?;
    ui::print_step(label);
    println!("{yaml}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OperationMode;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        logs: LogsCommand,
    }

    fn parse(args: &[&str]) -> LogsCommand {
        let mut argv = vec!["ovn-debug"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().logs
    }

    #[test]
    fn test_defaults() {
        let cmd = parse(&[]);
        let request = cmd.request().unwrap();
        assert_eq!(request.selection.pod_pattern, "ovnkube-node");
        assert_eq!(request.location, DocumentLocation::default());
        assert_eq!(
            request.mode,
            OperationMode::Apply {
                levels: LogLevels::default()
            }
        );
        assert_eq!(cmd.executor_config(), ExecutorConfig::default());
    }

    #[test]
    fn test_node_list_is_parsed() {
        let request = parse(&["--nodes", "worker-2, worker-1"]).request().unwrap();
        assert_eq!(request.selection.nodes, vec!["worker-1", "worker-2"]);
    }

    #[test]
    fn test_malformed_node_list() {
        assert!(parse(&["--nodes", "a,,b"]).request().is_err());
    }

    #[test]
    fn test_revert_with_all_nodes_rejected() {
        let err = parse(&["--revert", "--all-nodes"]).request().unwrap_err();
        assert!(err.to_string().contains("--all-nodes"));
    }

    #[test]
    fn test_level_range_enforced_by_parser() {
        assert!(Harness::try_parse_from(["ovn-debug", "--ovn-kube-log-level", "11"]).is_err());
        assert!(Harness::try_parse_from(["ovn-debug", "--ovn-log-level", "verbose"]).is_err());
        let cmd = parse(&["--ovn-kube-log-level", "2", "--ovn-log-level", "info"]);
        match cmd.request().unwrap().mode {
            OperationMode::Apply { levels } => {
                assert_eq!(levels.kube.get(), 2);
                assert_eq!(levels.ovn, OvnLogLevel::Info);
            }
            OperationMode::Revert => panic!("expected apply"),
        }
    }
}
