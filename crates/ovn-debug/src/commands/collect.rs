//! Collect command - run RETIS packet capture on debug-enabled nodes.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use super::GlobalArgs;
use crate::collect::{
    CollectOptions, HelperScript, OcDebugShell, RetisCollector, DEFAULT_RETIS_IMAGE,
    DEFAULT_SCRIPT_URL, DEFAULT_WORKING_DIRECTORY,
};
use crate::config::{DocumentLocation, DEFAULT_CONFIG_MAP, DEFAULT_NAMESPACE};
use crate::store::OverrideStore;
use crate::{report, ui};

/// Start or stop RETIS collection on the nodes listed in the ConfigMap.
#[derive(Args, Debug, Clone)]
pub struct CollectCommand {
    /// RETIS container image to use.
    #[arg(long, default_value = DEFAULT_RETIS_IMAGE)]
    retis_image: String,

    /// Working directory on the node for the script and events.json.
    #[arg(long, default_value = DEFAULT_WORKING_DIRECTORY)]
    working_directory: String,

    /// Namespace to read the ConfigMap from.
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the ConfigMap listing the nodes.
    #[arg(long, default_value = DEFAULT_CONFIG_MAP)]
    config_map: String,

    /// Show the commands that would run without running them.
    #[arg(long)]
    dry_run: bool,

    /// Run on up to 5 nodes at once instead of one at a time.
    #[arg(long)]
    parallel: bool,

    /// Stop a running collection instead of starting one.
    #[arg(long)]
    stop: bool,

    /// Time budget per node for the collection or stop command.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Where to download retis_in_container.sh from.
    #[arg(long, default_value = DEFAULT_SCRIPT_URL)]
    script_url: String,
}

impl CollectCommand {
    #[must_use]
    pub fn options(&self) -> CollectOptions {
        CollectOptions {
            retis_image: self.retis_image.clone(),
            working_directory: self.working_directory.clone(),
            script_url: self.script_url.clone(),
            dry_run: self.dry_run,
            parallel: self.parallel,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Run the collect command.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster or the nodes cannot be reached, or if
    /// collection failed on every node.
    pub async fn run(&self, global: &GlobalArgs) -> Result<()> {
        let options = self.options();
        let human = !global.json;

        if self.stop {
            for flag in options.ignored_when_stopping() {
                notice(human, &format!("{flag} is ignored when using --stop"));
            }
        }

        let (cluster, source) = global.connect().await?;
        let location = DocumentLocation {
            namespace: self.namespace.clone(),
            name: self.config_map.clone(),
        };
        let store = OverrideStore::new(&cluster, location.clone());
        let document = store
            .read()
            .await
            .with_context(|| format!("Failed to read ConfigMap {location}"))?;
        let Some(document) = document else {
            notice(
                human,
                &format!("ConfigMap {location} not found. Enable debug logging first with `ovn-debug logs`"),
            );
            return Ok(());
        };
        let nodes = document.extract_nodes();
        if nodes.is_empty() {
            notice(human, &format!("No worker nodes found in ConfigMap {location}"));
            return Ok(());
        }
        info!(count = nodes.len(), nodes = %nodes, "Nodes from ConfigMap");
        if human {
            ui::print_info(&format!("Found {} nodes in ConfigMap: {nodes}", nodes.len()));
        }

        let shell = if self.dry_run {
            OcDebugShell::new("oc".into(), source.primary_path())
        } else {
            OcDebugShell::locate(source.primary_path())?
        };
        let collector = RetisCollector::new(&shell, options);

        let report = if self.stop {
            if human {
                ui::print_step(&format!("Stopping RETIS collection on {} nodes", nodes.len()));
            }
            collector.stop(&nodes).await
        } else {
            if human {
                ui::print_step(&format!("Starting RETIS collection on {} nodes", nodes.len()));
                ui::print_kv("RETIS image", &self.retis_image);
                ui::print_kv("Working directory", &self.working_directory);
            }
            if self.dry_run {
                collector.start(&nodes, &[]).await
            } else {
                let script = HelperScript::download(&self.script_url)
                    .await
                    .context("Failed to download retis_in_container.sh")?;
                collector.start(&nodes, script.contents()).await
            }
        };

        if global.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            report::print_collection_report(&report);
        }

        if !report.dry_run && report.total() > 0 && report.successes() == 0 {
            anyhow::bail!("RETIS {} failed on all {} nodes", report.action, report.total());
        }
        Ok(())
    }
}

/// Warn on the console, or through the log when stdout carries JSON.
fn notice(human: bool, message: &str) {
    if human {
        ui::print_warning(message);
    } else {
        warn!("{message}");
    }
}
