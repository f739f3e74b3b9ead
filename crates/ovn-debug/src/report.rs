//! Human-readable summaries of operation and collection results.

use crate::collect::{CollectAction, CollectionReport, NodeOutcome};
use crate::executor::{MutationOutcome, OperationSummary};
use crate::planner::PlanMode;
use crate::restart::{PodOutcome, RestartReport};
use crate::store::WriteAck;
use crate::ui;

/// Print the outcome of a `logs` operation.
pub fn print_operation_summary(summary: &OperationSummary) {
    let title = match (summary.mode, summary.dry_run) {
        (PlanMode::Apply, false) => "Debug Logging Enabled",
        (PlanMode::Apply, true) => "Debug Logging Preview",
        (PlanMode::Revert, false) => "Debug Logging Reverted",
        (PlanMode::Revert, true) => "Revert Preview",
    };
    ui::print_section(title);

    ui::print_kv("ConfigMap", &summary.location.to_string());
    if let Some(strategy) = summary.strategy {
        ui::print_kv("Selection", &strategy.to_string());
    }
    ui::print_kv("Affected nodes", &summary.plan.affected_nodes.len().to_string());
    for node in &summary.plan.affected_nodes {
        let note = if summary.plan.skipped_control_plane.contains(node) {
            " (control plane, covered by _master)"
        } else {
            ""
        };
        ui::print_list_item(&format!("{node}{note}"));
    }

    let changed = summary.plan.changed_keys();
    if !changed.is_empty() {
        ui::print_kv("Changed entries", &changed.join(", "));
    }
    if let Some(levels) = summary
        .plan
        .to_write
        .as_ref()
        .and_then(|doc| doc.levels().into_values().flatten().next())
    {
        ui::print_kv(
            "Levels",
            &format!("OVN_KUBE_LOG_LEVEL={} OVN_LOG_LEVEL={}", levels.kube, levels.ovn),
        );
    }
    println!();

    match &summary.mutation {
        MutationOutcome::Skipped => ui::print_dry_run("No changes were made"),
        MutationOutcome::Unchanged => ui::print_info("ConfigMap already up to date"),
        MutationOutcome::Written { ack, attempts } => {
            let verb = match ack {
                WriteAck::Created => "Created",
                WriteAck::Replaced => "Updated",
            };
            ui::print_success(&format!(
                "{verb} ConfigMap {}{}",
                summary.location,
                retry_note(*attempts)
            ));
        }
        MutationOutcome::Deleted { attempts } => ui::print_success(&format!(
            "Deleted ConfigMap {}{}",
            summary.location,
            retry_note(*attempts)
        )),
        MutationOutcome::AlreadyAbsent => ui::print_info(&format!(
            "ConfigMap {} not found; debug logging is not enabled",
            summary.location
        )),
    }

    if summary.dry_run && !summary.would_restart.is_empty() {
        ui::print_dry_run(&format!(
            "Would restart {} pods:",
            summary.would_restart.len()
        ));
        for pod in &summary.would_restart {
            ui::print_list_item(&format!(
                "{}/{} on {}",
                pod.namespace,
                pod.name,
                pod.node.as_deref().unwrap_or("?")
            ));
        }
    }

    if let Some(report) = &summary.restart {
        print_restart_report(report);
    }
    println!();
}

/// Print the per-pod restart table.
pub fn print_restart_report(report: &RestartReport) {
    println!();
    ui::print_step(&format!("Pod restarts ({} pods)", report.entries.len()));
    for entry in &report.entries {
        let name = format!("{:<24} {}/{}", truncate(&entry.node, 24), entry.namespace, entry.pod);
        match &entry.outcome {
            PodOutcome::Deleted => ui::print_check_result(&name, true, None),
            PodOutcome::Failed(message) => {
                ui::print_check_result(&name, false, Some(&truncate(message, 60)));
            }
            PodOutcome::TimedOut => ui::print_check_result(&name, false, Some("timed out")),
        }
    }
    for node in &report.nodes_without_pods {
        ui::print_warning(&format!("No matching pods on {node}"));
    }
    if report.is_partial() {
        ui::print_warning(&format!(
            "{}/{} pods restarted; the ConfigMap change is kept. Delete the failed pods manually.",
            report.deleted_count(),
            report.entries.len()
        ));
    } else if !report.is_empty() {
        ui::print_success(&format!("Restarted {} pods", report.deleted_count()));
    }
}

/// Print a RETIS start or stop summary.
pub fn print_collection_report(report: &CollectionReport) {
    let title = match report.action {
        CollectAction::Start => "RETIS Collection Summary",
        CollectAction::Stop => "RETIS Stop Summary",
    };
    ui::print_section(title);

    for entry in &report.entries {
        let elapsed = format!("{:.1}s", entry.elapsed_secs);
        match &entry.outcome {
            NodeOutcome::Planned(commands) => {
                ui::print_dry_run(&format!("{}:", entry.node));
                for command in commands {
                    println!("    {command}");
                }
            }
            NodeOutcome::Started(status) => ui::print_check_result(
                &entry.node,
                status.is_success(),
                Some(&format!("unit {status} ({elapsed})")),
            ),
            NodeOutcome::Stopped => {
                ui::print_check_result(&entry.node, true, Some(&format!("stopped ({elapsed})")));
            }
            NodeOutcome::SetupFailed(message) => ui::print_check_result(
                &entry.node,
                false,
                Some(&format!("script setup failed: {}", truncate(message, 60))),
            ),
            NodeOutcome::Failed(message) => ui::print_check_result(
                &entry.node,
                false,
                Some(&format!("{} ({elapsed})", truncate(message, 60))),
            ),
            NodeOutcome::TimedOut => {
                ui::print_check_result(&entry.node, false, Some(&format!("timed out ({elapsed})")));
            }
        }
    }

    println!();
    ui::print_kv("Total nodes", &report.total().to_string());
    if report.dry_run {
        ui::print_dry_run("No actual commands were executed.");
        return;
    }
    ui::print_kv("Successful", &report.successes().to_string());
    ui::print_kv("Failed", &report.failures().to_string());
    println!();

    let verb = match report.action {
        CollectAction::Start => "RETIS collection started",
        CollectAction::Stop => "RETIS collection stopped",
    };
    if report.all_succeeded() {
        ui::print_success(&format!("{verb} on all nodes"));
    } else if report.successes() > 0 {
        ui::print_warning(&format!(
            "{verb} on {}/{} nodes",
            report.successes(),
            report.total()
        ));
    } else {
        ui::print_error(&format!("{} failed on all nodes", report.action));
    }
}

fn retry_note(attempts: u32) -> String {
    if attempts > 1 {
        format!(" after {attempts} attempts")
    } else {
        String::new()
    }
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
