//! OVN-Kubernetes debug toolkit.
//!
//! Toggles debug logging for the OVN-Kubernetes control plane through the
//! `env-overrides` ConfigMap and drives RETIS packet capture on the nodes
//! that carry debug overrides.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ovn_debug::commands::collect::CollectCommand;
use ovn_debug::commands::logs::LogsCommand;
use ovn_debug::commands::GlobalArgs;

/// OVN-Kubernetes debug logging and packet capture.
#[derive(Parser)]
#[command(
    name = "ovn-debug",
    version,
    about = "Toggle OVN-Kubernetes debug logging and collect RETIS traces",
    long_about = "Enable or revert OVN-Kubernetes debug logging on selected nodes.\n\n\
                  Debug levels are written to the env-overrides ConfigMap in the\n\
                  openshift-ovn-kubernetes namespace and take effect when the\n\
                  ovnkube-node pods restart.\n\n\
                  Applying the same settings twice is a no-op, and reverting a\n\
                  cluster without debug logging succeeds without changes."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable or revert debug logging.
    ///
    /// Targets an explicit node list, every node, or the nodes running pods
    /// that match a pattern, and optionally restarts the affected pods.
    Logs(LogsCommand),

    /// Start or stop RETIS collection on debug-enabled nodes.
    ///
    /// Reads the node list from the env-overrides ConfigMap and runs the
    /// RETIS container through `oc debug` on each node.
    Collect(CollectCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.global.debug {
        EnvFilter::new("info,ovn_debug=debug")
    } else {
        EnvFilter::new("warn,ovn_debug=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Logs(cmd) => cmd.run(&cli.global).await,
        Commands::Collect(cmd) => cmd.run(&cli.global).await,
    }
}
