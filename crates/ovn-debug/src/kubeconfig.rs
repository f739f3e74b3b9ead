//! Kubeconfig resolution and client construction.
//!
//! The kubeconfig is taken from, in order:
//! - `--kubeconfig` (colon-separated lists are merged)
//! - the inferred current context with `--use-current-context`
//! - `KUBECONFIG`, merged the same way
//! - an interactive prompt when attached to a terminal
//! - `~/.kube/config`

use std::ffi::{OsStr, OsString};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info, warn};

use crate::cluster::KubeCluster;
use crate::ui;

/// Connection flags shared by every subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub kubeconfig: Option<PathBuf>,
    /// Value of `KUBECONFIG`, read by the caller.
    pub kubeconfig_env: Option<OsString>,
    pub use_current_context: bool,
    pub disable_ssl_verification: bool,
    /// Human-facing mode: allow prompting for a path and print progress.
    pub interactive: bool,
}

/// Where the cluster credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigSource {
    /// One or more files named on the command line or in `KUBECONFIG`.
    Files(Vec<PathBuf>),
    /// Whatever `Config::infer` finds (in-cluster or default context).
    CurrentContext,
}

impl KubeconfigSource {
    /// Path to hand to external tools such as `oc`.
    #[must_use]
    pub fn primary_path(&self) -> Option<&Path> {
        match self {
            Self::Files(paths) => paths.first().map(PathBuf::as_path),
            Self::CurrentContext => None,
        }
    }
}

impl std::fmt::Display for KubeconfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Files(paths) => {
                let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "{}", joined.join(":"))
            }
            Self::CurrentContext => write!(f, "current context"),
        }
    }
}

/// Get the default kubeconfig path (~/.kube/config).
#[must_use]
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".kube").join("config"))
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Decide where credentials come from.
///
/// `prompt` is only called when no flag, environment value or current
/// context applies; an empty answer falls back to `~/.kube/config`.
///
/// # Errors
///
/// Returns an error if a named file does not exist or no kubeconfig can be
/// found at all.
pub fn resolve_source<P>(options: &ConnectOptions, prompt: P) -> Result<KubeconfigSource>
where
    P: FnOnce() -> Result<Option<String>>,
{
    if let Some(raw) = &options.kubeconfig {
        return file_source(raw.as_os_str());
    }

    if options.use_current_context {
        return Ok(KubeconfigSource::CurrentContext);
    }

    if let Some(raw) = &options.kubeconfig_env {
        debug!("Using KUBECONFIG from the environment");
        return file_source(raw);
    }

    if options.interactive {
        if let Some(answer) = prompt()? {
            let answer = answer.trim();
            if !answer.is_empty() {
                let path = expand_home(Path::new(answer));
                if !path.exists() {
                    anyhow::bail!("Kubeconfig file not found at: {}", path.display());
                }
                return Ok(KubeconfigSource::Files(vec![path]));
            }
        }
    }

    let default = default_kubeconfig_path().context("Could not determine home directory")?;
    if default.exists() {
        debug!(path = %default.display(), "Using default kubeconfig");
        return Ok(KubeconfigSource::Files(vec![default]));
    }
    anyhow::bail!(
        "No kubeconfig found. Pass --kubeconfig, set KUBECONFIG, or use --use-current-context"
    )
}

/// Split a colon-separated path list and check every file exists.
fn file_source(raw: &OsStr) -> Result<KubeconfigSource> {
    let paths: Vec<PathBuf> = std::env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| expand_home(&p))
        .collect();
    if paths.is_empty() {
        anyhow::bail!("Kubeconfig path is empty");
    }
    for path in &paths {
        if !path.exists() {
            anyhow::bail!("Kubeconfig file not found at: {}", path.display());
        }
    }
    Ok(KubeconfigSource::Files(paths))
}

/// Ask for a kubeconfig path on the terminal.
///
/// # Errors
///
/// Returns an error if reading from the terminal fails.
pub fn prompt_for_path() -> Result<Option<String>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let answer: String = dialoguer::Input::new()
        .with_prompt("Path to your kubeconfig file (empty for ~/.kube/config)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read kubeconfig path")?;
    Ok(Some(answer))
}

/// Build a client from `source`, honouring the SSL switch.
///
/// # Errors
///
/// Returns an error if the kubeconfig cannot be read or the client cannot
/// be created.
pub async fn build_client(source: &KubeconfigSource, disable_ssl_verification: bool) -> Result<Client> {
    let mut config = match source {
        KubeconfigSource::Files(paths) => {
            let mut merged: Option<Kubeconfig> = None;
            for path in paths {
                let next = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig from {}", path.display()))?;
                merged = Some(match merged {
                    Some(current) => current
                        .merge(next)
                        .context("Failed to merge kubeconfig files")?,
                    None => next,
                });
            }
            let kubeconfig = merged.context("No kubeconfig files given")?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to create Kubernetes config from kubeconfig")?
        }
        KubeconfigSource::CurrentContext => Config::infer()
            .await
            .context("Failed to infer Kubernetes config from the current context")?,
    };

    if disable_ssl_verification {
        warn!("TLS certificate verification disabled");
        config.accept_invalid_certs = true;
    }

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Resolve credentials, build a client and verify the API server answers.
///
/// # Errors
///
/// Returns an error if resolution, client creation or the connectivity
/// check fails.
pub async fn connect(options: &ConnectOptions) -> Result<(KubeCluster, KubeconfigSource)> {
    let source = resolve_source(options, prompt_for_path)?;
    info!(source = %source, "Loading kubeconfig");
    if options.disable_ssl_verification && options.interactive {
        ui::print_warning("SSL certificate verification is disabled");
    }

    let client = build_client(&source, options.disable_ssl_verification).await?;
    let cluster = KubeCluster::new(client);
    let version = cluster
        .check_connection()
        .await
        .context("Failed to connect to Kubernetes cluster. Verify the kubeconfig is valid and the cluster is reachable")?;
    if options.interactive {
        ui::print_success(&format!("Connected to Kubernetes cluster ({version})"));
    }
    Ok((cluster, source))
}
