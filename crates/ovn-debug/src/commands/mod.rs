//! CLI subcommands.

pub mod collect;
pub mod logs;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::cluster::KubeCluster;
use crate::kubeconfig::{self, ConnectOptions, KubeconfigSource};

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to the kubeconfig file. Falls back to KUBECONFIG, then a prompt,
    /// then ~/.kube/config.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Use the current kubectl context; takes precedence over KUBECONFIG but
    /// not over --kubeconfig.
    #[arg(long, global = true)]
    pub use_current_context: bool,

    /// Disable TLS certificate verification.
    #[arg(long, global = true)]
    pub disable_ssl_verification: bool,

    /// Enable debug logging and print the generated ConfigMap.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print the result as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            kubeconfig: self.kubeconfig.clone(),
            kubeconfig_env: std::env::var_os("KUBECONFIG").filter(|value| !value.is_empty()),
            use_current_context: self.use_current_context,
            disable_ssl_verification: self.disable_ssl_verification,
            interactive: !self.json,
        }
    }

    /// Connect to the cluster and verify it answers.
    ///
    /// # Errors
    ///
    /// Returns an error if no kubeconfig is usable or the API server is
    /// unreachable.
    pub async fn connect(&self) -> Result<(KubeCluster, KubeconfigSource)> {
        kubeconfig::connect(&self.connect_options()).await
    }
}
