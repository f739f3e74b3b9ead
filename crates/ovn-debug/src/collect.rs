//! RETIS packet-capture collection on the nodes carrying debug overrides.
//!
//! Collection runs `retis_in_container.sh` under a transient systemd unit
//! on each node, reached through `oc debug node/<name> -- chroot /host`.
//! The helper script is downloaded once, pushed to nodes that lack it, and
//! then started (or stopped) per node through the worker pool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::nodes::NodeSet;
use crate::pool::{run_pool, ItemOutcome, DEFAULT_WORKERS};

/// Default RETIS image, served from the in-cluster registry.
pub const DEFAULT_RETIS_IMAGE: &str = "image-registry.openshift-image-registry.svc:5000/default/retis";

/// Default directory on the node holding the script and `events.json`.
pub const DEFAULT_WORKING_DIRECTORY: &str = "/var/tmp";

/// Upstream location of the helper script.
pub const DEFAULT_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/retis-org/retis/main/tools/retis_in_container.sh";

const SCRIPT_NAME: &str = "retis_in_container.sh";
const UNIT_NAME: &str = "RETIS";
const PACKET_FILTER: &str = "tcp port 8080 or tcp port 8081";

const SETUP_TIMEOUT: Duration = Duration::from_secs(30);
const COPY_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// Output of one command run on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ShellOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short description of a failure for reports.
    #[must_use]
    pub fn failure_message(&self) -> String {
        let code = self
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let detail = self.stderr.trim();
        if detail.is_empty() {
            format!("exit code {code}")
        } else {
            format!("exit code {code}: {detail}")
        }
    }
}

/// Runs commands in a node's host namespace.
#[async_trait]
pub trait NodeShell: Send + Sync {
    /// Run `command` on `node`, feeding `stdin` if given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Collection`] if the command cannot be started or
    /// exceeds `limit`.
    async fn run(
        &self,
        node: &str,
        command: &[String],
        stdin: Option<&[u8]>,
        limit: Duration,
    ) -> Result<ShellOutput>;
}

/// Render a command the way `oc debug` would be invoked from a shell.
#[must_use]
pub fn render_command(node: &str, command: &[String]) -> String {
    let mut parts = vec![
        "oc".to_string(),
        "debug".to_string(),
        format!("node/{node}"),
        "--".to_string(),
        "chroot".to_string(),
        "/host".to_string(),
    ];
    parts.extend(command.iter().map(|arg| quote(arg)));
    parts.join(" ")
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == ';') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// [`NodeShell`] backed by the `oc` CLI.
pub struct OcDebugShell {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl OcDebugShell {
    #[must_use]
    pub fn new(binary: PathBuf, kubeconfig: Option<&Path>) -> Self {
        Self {
            binary,
            kubeconfig: kubeconfig.map(Path::to_path_buf),
        }
    }

    /// Locate `oc` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Collection`] if `oc` is not installed.
    pub fn locate(kubeconfig: Option<&Path>) -> Result<Self> {
        let binary = which::which("oc").map_err(|_| {
            Error::Collection(
                "'oc' command not found. Please ensure the OpenShift CLI is installed and in PATH"
                    .into(),
            )
        })?;
        debug!(binary = %binary.display(), "Found oc");
        Ok(Self::new(binary, kubeconfig))
    }
}

#[async_trait]
impl NodeShell for OcDebugShell {
    async fn run(
        &self,
        node: &str,
        command: &[String],
        stdin: Option<&[u8]>,
        limit: Duration,
    ) -> Result<ShellOutput> {
        debug!(node, command = %render_command(node, command), "Running node command");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("debug")
            .arg(format!("node/{node}"))
            .args(["--", "chroot", "/host"])
            .args(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &self.kubeconfig {
            cmd.env("KUBECONFIG", path);
        }

        let started = Instant::now();
        let run = async {
            let mut child = cmd.spawn().map_err(|e| {
                Error::Collection(format!("Failed to spawn oc debug on {node}: {e}"))
            })?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input).await?;
                pipe.shutdown().await?;
            }
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| Error::Collection(format!("oc debug on {node} failed: {e}")))?;
            Ok::<_, Error>(output)
        };

        // Dropping the child on expiry kills `oc`, even mid-write.
        match timeout(limit, run).await {
            Ok(Ok(output)) => Ok(ShellOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                elapsed: started.elapsed(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Collection(format!(
                "Command on {node} timed out after {} seconds",
                limit.as_secs_f64()
            ))),
        }
    }
}

/// State of the `RETIS` systemd unit, from `systemctl status` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Unknown,
}

impl UnitStatus {
    /// Classify `systemctl status` output. Matching is case-insensitive.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let text = output.to_lowercase();
        if text.contains("failed") {
            Self::Failed
        } else if text.contains("active: active") {
            Self::Running
        } else if text.contains("active: inactive") && text.contains("exited") {
            if text.contains("code=exited, status=0") {
                Self::Completed
            } else {
                Self::CompletedWithErrors
            }
        } else {
            Self::Unknown
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Running | Self::Completed)
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed successfully"),
            Self::CompletedWithErrors => write!(f, "completed with errors"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether collection is being started or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectAction {
    Start,
    Stop,
}

impl std::fmt::Display for CollectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "collection"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Collection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    pub retis_image: String,
    pub working_directory: String,
    pub script_url: String,
    pub dry_run: bool,
    pub parallel: bool,
    /// Budget for launching collection or stopping it on one node.
    pub timeout: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            retis_image: DEFAULT_RETIS_IMAGE.into(),
            working_directory: DEFAULT_WORKING_DIRECTORY.into(),
            script_url: DEFAULT_SCRIPT_URL.into(),
            dry_run: false,
            parallel: false,
            timeout: Duration::from_secs(300),
        }
    }
}

impl CollectOptions {
    /// Options that only matter when starting and differ from the defaults.
    #[must_use]
    pub fn ignored_when_stopping(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.retis_image != DEFAULT_RETIS_IMAGE {
            ignored.push("--retis-image");
        }
        if self.working_directory != DEFAULT_WORKING_DIRECTORY {
            ignored.push("--working-directory");
        }
        ignored
    }

    fn workers(&self) -> usize {
        if self.parallel {
            DEFAULT_WORKERS
        } else {
            1
        }
    }

    fn script_path(&self) -> String {
        format!("{}/{SCRIPT_NAME}", self.working_directory.trim_end_matches('/'))
    }
}

/// Result for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Collection launched; carries the unit state observed afterwards.
    Started(UnitStatus),
    Stopped,
    /// The helper script could not be installed; the node was skipped.
    SetupFailed(String),
    Failed(String),
    TimedOut,
    /// Dry run; carries the commands that would run.
    Planned(Vec<String>),
}

impl NodeOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Started(status) => status.is_success(),
            Self::Stopped | Self::Planned(_) => true,
            Self::SetupFailed(_) | Self::Failed(_) | Self::TimedOut => false,
        }
    }
}

/// One row of the collection report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCollection {
    pub node: String,
    pub outcome: NodeOutcome,
    pub elapsed_secs: f64,
}

/// Per-node collection results.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub action: CollectAction,
    pub dry_run: bool,
    pub entries: Vec<NodeCollection>,
    pub started_at: DateTime<Utc>,
}

impl CollectionReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.total() - self.successes()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures() == 0
    }
}

/// The downloaded helper script, pushed to nodes over stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperScript {
    contents: Vec<u8>,
}

impl HelperScript {
    #[must_use]
    pub fn from_bytes(contents: Vec<u8>) -> Self {
        Self { contents }
    }

    /// Download the script from `url`.
    ///
    /// # Errors
    ///
    /// Returns HTTP errors, or [`Error::Collection`] for a non-success status
    /// or an empty body.
    pub async fn download(url: &str) -> Result<Self> {
        info!(url, "Downloading {SCRIPT_NAME}");
        let response = reqwest::get(url).await?;
        if !response.status().is_success() {
            return Err(Error::Collection(format!(
                "Failed to download {SCRIPT_NAME}: HTTP {}",
                response.status()
            )));
        }
        let contents = response.bytes().await?.to_vec();
        if contents.is_empty() {
            return Err(Error::Collection(format!("Downloaded {SCRIPT_NAME} is empty")));
        }
        info!(bytes = contents.len(), "Downloaded helper script");
        Ok(Self::from_bytes(contents))
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

/// Starts and stops RETIS collection across nodes.
pub struct RetisCollector<'a> {
    shell: &'a dyn NodeShell,
    options: CollectOptions,
}

impl<'a> RetisCollector<'a> {
    #[must_use]
    pub fn new(shell: &'a dyn NodeShell, options: CollectOptions) -> Self {
        Self { shell, options }
    }

    /// `systemd-run` invocation that launches collection.
    #[must_use]
    pub fn collection_command(&self) -> Vec<String> {
        let workdir = &self.options.working_directory;
        let inner = format!(
            "export RETIS_IMAGE='{image}'; {script} collect -o events.json \
             --allow-system-changes --ovs-track --stack --probe-stack \
             --filter-packet '{PACKET_FILTER}'",
            image = self.options.retis_image,
            script = self.options.script_path(),
        );
        vec![
            "systemd-run".into(),
            format!("--unit={UNIT_NAME}"),
            format!("--working-directory={workdir}"),
            "sh".into(),
            "-c".into(),
            inner,
        ]
    }

    #[must_use]
    pub fn status_command() -> Vec<String> {
        vec!["systemctl".into(), "status".into(), UNIT_NAME.into()]
    }

    #[must_use]
    pub fn stop_command() -> Vec<String> {
        vec!["systemctl".into(), "stop".into(), UNIT_NAME.into()]
    }

    /// Commands a run of `action` would issue on `node`, rendered for display.
    #[must_use]
    pub fn planned_commands(&self, node: &str, action: CollectAction) -> Vec<String> {
        let script = self.options.script_path();
        let commands = match action {
            CollectAction::Start => vec![
                vec!["ls".into(), "-la".into(), script.clone()],
                vec![
                    "mkdir".into(),
                    "-p".into(),
                    self.options.working_directory.clone(),
                ],
                vec!["sh".into(), "-c".into(), format!("cat > {script}")],
                vec!["chmod".into(), "755".into(), script],
                self.collection_command(),
                Self::status_command(),
            ],
            CollectAction::Stop => vec![Self::stop_command()],
        };
        commands
            .iter()
            .map(|command| render_command(node, command))
            .collect()
    }

    /// Make sure the helper script is present and executable on `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Collection`] if the script cannot be installed.
    pub async fn setup_node(&self, node: &str, script: &[u8]) -> Result<()> {
        let path = self.options.script_path();
        let listing = self
            .shell
            .run(node, &["ls".into(), "-la".into(), path.clone()], None, SETUP_TIMEOUT)
            .await?;
        let exists = listing.success() && !listing.stdout.trim().is_empty();
        if exists {
            let mode: String = listing.stdout.trim().chars().take(10).collect();
            if mode.contains('x') {
                debug!(node, "Helper script already installed");
                return Ok(());
            }
            warn!(node, mode = %mode, "Helper script exists but is not executable");
        }

        let mkdir = self
            .shell
            .run(
                node,
                &[
                    "mkdir".into(),
                    "-p".into(),
                    self.options.working_directory.clone(),
                ],
                None,
                SETUP_TIMEOUT,
            )
            .await?;
        if !mkdir.success() {
            warn!(node, error = %mkdir.failure_message(), "mkdir failed; the directory may already exist");
        }

        if !exists {
            let copy = self
                .shell
                .run(
                    node,
                    &["sh".into(), "-c".into(), format!("cat > {path}")],
                    Some(script),
                    COPY_TIMEOUT,
                )
                .await?;
            if !copy.success() {
                return Err(Error::Collection(format!(
                    "Failed to copy {SCRIPT_NAME} to {node}: {}",
                    copy.failure_message()
                )));
            }
        }

        let chmod = self
            .shell
            .run(node, &["chmod".into(), "755".into(), path.clone()], None, SETUP_TIMEOUT)
            .await?;
        if !chmod.success() {
            return Err(Error::Collection(format!(
                "Failed to set permissions on {node}: {}",
                chmod.failure_message()
            )));
        }

        let verify = self
            .shell
            .run(node, &["ls".into(), "-la".into(), path], None, SETUP_TIMEOUT)
            .await?;
        if !verify.success() {
            return Err(Error::Collection(format!(
                "Script verification failed on {node}: {}",
                verify.failure_message()
            )));
        }
        info!(node, "Helper script ready");
        Ok(())
    }

    /// Install the script and start collection on every node.
    ///
    /// Nodes whose setup fails are reported and skipped.
    pub async fn start(&self, nodes: &NodeSet, script: &[u8]) -> CollectionReport {
        let started_at = Utc::now();
        if self.options.dry_run {
            return self.dry_run(nodes, CollectAction::Start, started_at);
        }

        let mut entries = Vec::new();
        let mut ready = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            info!(node, progress = %format!("{}/{}", index + 1, nodes.len()), "Setting up helper script");
            let begun = Instant::now();
            match self.setup_node(node, script).await {
                Ok(()) => ready.push(node.to_string()),
                Err(e) => {
                    warn!(node, error = %e, "Setup failed; skipping node");
                    entries.push(NodeCollection {
                        node: node.to_string(),
                        outcome: NodeOutcome::SetupFailed(e.to_string()),
                        elapsed_secs: begun.elapsed().as_secs_f64(),
                    });
                }
            }
        }

        let limit = self.options.timeout;
        let results = run_pool(
            ready,
            self.options.workers(),
            limit + STATUS_TIMEOUT,
            |node| async move { self.start_node(&node, limit).await },
        )
        .await;
        entries.extend(results.into_iter().map(|result| NodeCollection {
            outcome: match result.outcome {
                ItemOutcome::Completed(outcome) => outcome,
                ItemOutcome::TimedOut => NodeOutcome::TimedOut,
            },
            node: result.item,
            elapsed_secs: result.elapsed.as_secs_f64(),
        }));
        entries.sort_by(|a, b| a.node.cmp(&b.node));

        CollectionReport {
            action: CollectAction::Start,
            dry_run: false,
            entries,
            started_at,
        }
    }

    /// Stop the collection unit on every node.
    pub async fn stop(&self, nodes: &NodeSet) -> CollectionReport {
        let started_at = Utc::now();
        if self.options.dry_run {
            return self.dry_run(nodes, CollectAction::Stop, started_at);
        }

        let limit = self.options.timeout;
        let results = run_pool(
            nodes.iter().map(ToString::to_string).collect(),
            self.options.workers(),
            limit,
            |node: String| async move {
                match self.shell.run(&node, &Self::stop_command(), None, limit).await {
                    Ok(output) if output.success() => {
                        info!(node = %node, "RETIS unit stopped");
                        NodeOutcome::Stopped
                    }
                    Ok(output) => NodeOutcome::Failed(output.failure_message()),
                    Err(e) => NodeOutcome::Failed(e.to_string()),
                }
            },
        )
        .await;

        CollectionReport {
            action: CollectAction::Stop,
            dry_run: false,
            entries: results
                .into_iter()
                .map(|result| NodeCollection {
                    outcome: match result.outcome {
                        ItemOutcome::Completed(outcome) => outcome,
                        ItemOutcome::TimedOut => NodeOutcome::TimedOut,
                    },
                    node: result.item,
                    elapsed_secs: result.elapsed.as_secs_f64(),
                })
                .collect(),
            started_at,
        }
    }

    async fn start_node(&self, node: &str, limit: Duration) -> NodeOutcome {
        info!(node, image = %self.options.retis_image, "Starting RETIS collection");
        let launch = match self
            .shell
            .run(node, &self.collection_command(), None, limit)
            .await
        {
            Ok(output) => output,
            Err(e) => return NodeOutcome::Failed(e.to_string()),
        };
        if !launch.success() {
            warn!(node, error = %launch.failure_message(), "Collection command failed");
            return NodeOutcome::Failed(launch.failure_message());
        }

        // systemctl exits non-zero for inactive units, so only stdout matters.
        let status = match self
            .shell
            .run(node, &Self::status_command(), None, STATUS_TIMEOUT)
            .await
        {
            Ok(output) => UnitStatus::parse(&output.stdout),
            Err(e) => return NodeOutcome::Failed(e.to_string()),
        };
        if status.is_success() {
            info!(node, status = %status, "RETIS unit healthy");
        } else {
            warn!(node, status = %status, "RETIS unit not healthy");
        }
        NodeOutcome::Started(status)
    }

    fn dry_run(
        &self,
        nodes: &NodeSet,
        action: CollectAction,
        started_at: DateTime<Utc>,
    ) -> CollectionReport {
        CollectionReport {
            action,
            dry_run: true,
            entries: nodes
                .iter()
                .map(|node| NodeCollection {
                    node: node.to_string(),
                    outcome: NodeOutcome::Planned(self.planned_commands(node, action)),
                    elapsed_secs: 0.0,
                })
                .collect(),
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_parsing() {
        assert_eq!(
            UnitStatus::parse("● RETIS.service\n   Active: active (running) since Mon"),
            UnitStatus::Running
        );
        assert_eq!(
            UnitStatus::parse("Active: inactive (dead)\n Process: 12 ExecStart=sh (code=exited, status=0/SUCCESS)"),
            UnitStatus::Completed
        );
        assert_eq!(
            UnitStatus::parse("Active: inactive (dead)\n Process: 12 ExecStart=sh (code=exited, status=2)"),
            UnitStatus::CompletedWithErrors
        );
        assert_eq!(
            UnitStatus::parse("Active: failed (Result: exit-code)"),
            UnitStatus::Failed
        );
        assert_eq!(UnitStatus::parse("Unit RETIS.service could not be found."), UnitStatus::Unknown);
        assert_eq!(UnitStatus::parse(""), UnitStatus::Unknown);
    }

    #[test]
    fn test_unit_status_success() {
        assert!(UnitStatus::Running.is_success());
        assert!(UnitStatus::Completed.is_success());
        assert!(!UnitStatus::CompletedWithErrors.is_success());
        assert!(!UnitStatus::Unknown.is_success());
    }

    #[test]
    fn test_render_collection_command() {
        struct Unused;
        #[async_trait]
        impl NodeShell for Unused {
            async fn run(
                &self,
                _: &str,
                _: &[String],
                _: Option<&[u8]>,
                _: Duration,
            ) -> Result<ShellOutput> {
                unreachable!("dry rendering never runs commands")
            }
        }

        let collector = RetisCollector::new(&Unused, CollectOptions::default());
        let rendered = render_command("worker-1", &collector.collection_command());
        assert_eq!(
            rendered,
            "oc debug node/worker-1 -- chroot /host systemd-run --unit=RETIS \
             --working-directory=/var/tmp sh -c \"export RETIS_IMAGE='image-registry.openshift-image-registry.svc:5000/default/retis'; \
             /var/tmp/retis_in_container.sh collect -o events.json --allow-system-changes \
             --ovs-track --stack --probe-stack --filter-packet 'tcp port 8080 or tcp port 8081'\""
        );
        assert_eq!(
            render_command("worker-1", &RetisCollector::stop_command()),
            "oc debug node/worker-1 -- chroot /host systemctl stop RETIS"
        );
    }

    #[test]
    fn test_ignored_when_stopping() {
        let mut options = CollectOptions::default();
        assert!(options.ignored_when_stopping().is_empty());
        options.working_directory = "/tmp".into();
        assert_eq!(options.ignored_when_stopping(), vec!["--working-directory"]);
    }

    #[test]
    fn test_script_path_trims_trailing_slash() {
        let options = CollectOptions {
            working_directory: "/var/tmp/".into(),
            ..CollectOptions::default()
        };
        assert_eq!(options.script_path(), "/var/tmp/retis_in_container.sh");
    }

    #[test]
    fn test_helper_script_contents() {
        let script = HelperScript::from_bytes(b"#!/bin/sh\necho hi\n".to_vec());
        assert_eq!(script.contents(), b"#!/bin/sh\necho hi\n");
    }

    /// Stand-in `oc` that never reads stdin.
    #[cfg(unix)]
    fn stalled_oc(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("oc");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_stdin_write_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let shell = OcDebugShell::new(stalled_oc(dir.path()), None);
        // Larger than a pipe buffer, so the write blocks until `oc` reads.
        let script = vec![b'#'; 4 * 1024 * 1024];

        let begun = Instant::now();
        let err = shell
            .run(
                "worker-1",
                &["sh".into(), "-c".into(), "cat > /tmp/x".into()],
                Some(&script),
                Duration::from_millis(300),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(begun.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let shell = OcDebugShell::new(stalled_oc(dir.path()), None);

        let err = shell
            .run("worker-1", &RetisCollector::status_command(), None, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collection(_)));
    }
}
