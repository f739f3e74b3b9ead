//! Integration tests for RETIS collection using a scripted node shell.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ovn_debug::collect::{
    CollectAction, CollectOptions, NodeOutcome, NodeShell, RetisCollector, ShellOutput, UnitStatus,
};
use ovn_debug::{NodeSet, Result};
use tokio_test::assert_ok;

// =============================================================================
// Scripted shell
// =============================================================================

/// One command seen by [`ScriptedShell`].
#[derive(Debug, Clone)]
struct Call {
    node: String,
    command: String,
    stdin: Option<Vec<u8>>,
}

type Responder = Box<dyn Fn(&str, &str) -> ShellOutput + Send + Sync>;

/// Fake shell answering through a closure and recording every command.
struct ScriptedShell {
    respond: Responder,
    delays: BTreeMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedShell {
    fn new(respond: impl Fn(&str, &str) -> ShellOutput + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delays: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command on `node` sleeps for `delay` first.
    fn with_delay(mut self, node: &str, delay: Duration) -> Self {
        self.delays.insert(node.to_string(), delay);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn commands_on(&self, node: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.node == node)
            .map(|call| call.command)
            .collect()
    }
}

#[async_trait]
impl NodeShell for ScriptedShell {
    async fn run(
        &self,
        node: &str,
        command: &[String],
        stdin: Option<&[u8]>,
        _limit: Duration,
    ) -> Result<ShellOutput> {
        let joined = command.join(" ");
        self.calls.lock().unwrap().push(Call {
            node: node.to_string(),
            command: joined.clone(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
        if let Some(delay) = self.delays.get(node) {
            tokio::time::sleep(*delay).await;
        }
        Ok((self.respond)(node, &joined))
    }
}

fn ok(stdout: &str) -> ShellOutput {
    ShellOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        elapsed: Duration::from_millis(1),
    }
}

fn fail(code: i32, stderr: &str) -> ShellOutput {
    ShellOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
        elapsed: Duration::from_millis(1),
    }
}

const INSTALLED: &str = "-rwxr-xr-x. 1 root root 4096 Jan 1 00:00 /var/tmp/retis_in_container.sh";
const RUNNING: &str = "● RETIS.service\n   Loaded: loaded\n   Active: active (running) since Mon";
const FAILED: &str = "● RETIS.service\n   Active: failed (Result: exit-code)";

/// Script already installed, collection starts, unit reports running.
fn healthy(_node: &str, command: &str) -> ShellOutput {
    if command.starts_with("ls -la") {
        ok(INSTALLED)
    } else if command.starts_with("systemctl status") {
        ok(RUNNING)
    } else {
        ok("")
    }
}

fn nodes(names: &[&str]) -> NodeSet {
    names.iter().copied().collect()
}

fn options() -> CollectOptions {
    CollectOptions {
        parallel: true,
        ..CollectOptions::default()
    }
}

// =============================================================================
// Start
// =============================================================================

#[tokio::test]
async fn test_dry_run_runs_nothing() {
    let shell = ScriptedShell::new(healthy);
    let collector = RetisCollector::new(
        &shell,
        CollectOptions {
            dry_run: true,
            ..CollectOptions::default()
        },
    );

    let report = collector.start(&nodes(&["worker-1", "worker-2"]), &[]).await;

    assert!(shell.calls().is_empty());
    assert!(report.dry_run);
    assert_eq!(report.total(), 2);
    match &report.entries[0].outcome {
        NodeOutcome::Planned(commands) => {
            assert_eq!(commands.len(), 6);
            assert!(commands[4].starts_with("oc debug node/worker-1 -- chroot /host systemd-run"));
        }
        other => panic!("expected planned commands, got {other:?}"),
    }

    let stop = collector.stop(&nodes(&["worker-1"])).await;
    assert!(shell.calls().is_empty());
    assert_eq!(stop.action, CollectAction::Stop);
    assert_eq!(
        stop.entries[0].outcome,
        NodeOutcome::Planned(vec![
            "oc debug node/worker-1 -- chroot /host systemctl stop RETIS".to_string()
        ])
    );
}

#[tokio::test]
async fn test_installed_script_is_not_copied_again() {
    let shell = ScriptedShell::new(healthy);
    let collector = RetisCollector::new(&shell, options());

    let report = collector.start(&nodes(&["worker-1"]), b"#!/bin/sh\n").await;

    assert!(report.all_succeeded());
    assert_eq!(report.entries[0].outcome, NodeOutcome::Started(UnitStatus::Running));
    let commands = shell.commands_on("worker-1");
    assert_eq!(commands.len(), 3);
    assert!(commands[0].starts_with("ls -la"));
    assert!(commands[1].starts_with("systemd-run --unit=RETIS"));
    assert_eq!(commands[2], "systemctl status RETIS");
}

#[tokio::test]
async fn test_missing_script_is_installed() {
    let copied = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&copied);
    let shell = ScriptedShell::new(move |_, command| {
        if command.starts_with("sh -c cat") {
            seen.store(true, Ordering::SeqCst);
            ok("")
        } else if command.starts_with("ls -la") && !seen.load(Ordering::SeqCst) {
            fail(2, "No such file or directory")
        } else if command.starts_with("ls -la") {
            ok(INSTALLED)
        } else if command.starts_with("systemctl status") {
            ok(RUNNING)
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());
    let script = b"#!/bin/sh\necho retis\n";

    assert_ok!(collector.setup_node("worker-1", script).await);
    assert!(copied.load(Ordering::SeqCst));

    let calls = shell.calls();
    let commands: Vec<&str> = calls.iter().map(|c| c.command.as_str()).collect();
    assert_eq!(
        commands,
        vec![
            "ls -la /var/tmp/retis_in_container.sh",
            "mkdir -p /var/tmp",
            "sh -c cat > /var/tmp/retis_in_container.sh",
            "chmod 755 /var/tmp/retis_in_container.sh",
            "ls -la /var/tmp/retis_in_container.sh",
        ]
    );
    assert_eq!(calls[2].stdin.as_deref(), Some(&script[..]));
}

#[tokio::test]
async fn test_non_executable_script_is_only_chmodded() {
    let shell = ScriptedShell::new(|_, command| {
        if command.starts_with("ls -la") {
            ok("-rw-r--r--. 1 root root 4096 Jan 1 00:00 /var/tmp/retis_in_container.sh")
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());

    assert_ok!(collector.setup_node("worker-1", b"x").await);

    let commands = shell.commands_on("worker-1");
    assert!(commands.iter().any(|c| c.starts_with("chmod 755")));
    assert!(!commands.iter().any(|c| c.starts_with("sh -c cat")));
}

#[tokio::test]
async fn test_setup_failure_skips_only_that_node() {
    let installed = Arc::new(Mutex::new(BTreeSet::new()));
    let shell = ScriptedShell::new(move |node, command| {
        if command.starts_with("sh -c cat") {
            if node == "worker-2" {
                return fail(1, "Read-only file system");
            }
            installed.lock().unwrap().insert(node.to_string());
            ok("")
        } else if command.starts_with("ls -la") {
            if installed.lock().unwrap().contains(node) {
                ok(INSTALLED)
            } else {
                fail(2, "No such file or directory")
            }
        } else if command.starts_with("systemctl status") {
            ok(RUNNING)
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());

    let report = collector
        .start(&nodes(&["worker-1", "worker-2"]), b"script")
        .await;

    assert_eq!(report.total(), 2);
    assert_eq!(report.successes(), 1);
    assert_eq!(report.entries[0].node, "worker-1");
    assert_eq!(report.entries[0].outcome, NodeOutcome::Started(UnitStatus::Running));
    assert_eq!(report.entries[1].node, "worker-2");
    match &report.entries[1].outcome {
        NodeOutcome::SetupFailed(message) => assert!(message.contains("Read-only file system")),
        other => panic!("expected setup failure, got {other:?}"),
    }
    assert!(!shell
        .commands_on("worker-2")
        .iter()
        .any(|c| c.starts_with("systemd-run")));
}

#[tokio::test]
async fn test_unhealthy_unit_counts_as_failure() {
    let shell = ScriptedShell::new(|node, command| {
        if command.starts_with("ls -la") {
            ok(INSTALLED)
        } else if command.starts_with("systemctl status") {
            ok(if node == "worker-1" { RUNNING } else { FAILED })
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());

    let report = collector
        .start(&nodes(&["worker-1", "worker-2"]), b"script")
        .await;

    assert_eq!(report.entries[1].outcome, NodeOutcome::Started(UnitStatus::Failed));
    assert_eq!(report.failures(), 1);
    assert!(!report.all_succeeded());
}

#[tokio::test]
async fn test_failed_launch_is_reported() {
    let shell = ScriptedShell::new(|_, command| {
        if command.starts_with("ls -la") {
            ok(INSTALLED)
        } else if command.starts_with("systemd-run") {
            fail(1, "Unit RETIS.service already exists")
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());

    let report = collector.start(&nodes(&["worker-1"]), b"script").await;

    match &report.entries[0].outcome {
        NodeOutcome::Failed(message) => assert!(message.contains("already exists")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!shell
        .commands_on("worker-1")
        .iter()
        .any(|c| c.starts_with("systemctl status")));
}

// =============================================================================
// Stop
// =============================================================================

#[tokio::test]
async fn test_stop_reports_per_node() {
    let shell = ScriptedShell::new(|node, _| {
        if node == "worker-2" {
            fail(5, "Unit RETIS.service not loaded.")
        } else {
            ok("")
        }
    });
    let collector = RetisCollector::new(&shell, options());

    let report = collector
        .stop(&nodes(&["worker-1", "worker-2", "worker-3"]))
        .await;

    assert_eq!(report.action, CollectAction::Stop);
    assert_eq!(report.entries[0].outcome, NodeOutcome::Stopped);
    assert!(matches!(report.entries[1].outcome, NodeOutcome::Failed(_)));
    assert_eq!(report.entries[2].outcome, NodeOutcome::Stopped);
    for call in shell.calls() {
        assert_eq!(call.command, "systemctl stop RETIS");
    }
}

#[tokio::test]
async fn test_slow_node_times_out_alone() {
    let shell = ScriptedShell::new(|_, _| ok("")).with_delay("worker-2", Duration::from_secs(5));
    let collector = RetisCollector::new(
        &shell,
        CollectOptions {
            parallel: true,
            timeout: Duration::from_millis(100),
            ..CollectOptions::default()
        },
    );

    let report = collector.stop(&nodes(&["worker-1", "worker-2"])).await;

    assert_eq!(report.entries[0].outcome, NodeOutcome::Stopped);
    assert_eq!(report.entries[1].outcome, NodeOutcome::TimedOut);
}
