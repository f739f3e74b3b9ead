//! Operation orchestration.
//!
//! Drives one apply or revert through its phases:
//! - Planning: validate, check the namespace, select or read, plan
//! - DryRunPreview: report the plan and the pods that would restart
//! - Executing: write or delete with bounded conflict retries
//! - RestartPending: delete the affected OVN pods
//! - Done

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, PodInfo};
use crate::config::{
    DocumentLocation, ExecutorConfig, LogLevels, SelectionInput, DEFAULT_POD_PATTERN,
};
use crate::document::OverrideDocument;
use crate::error::{Error, Result};
use crate::nodes::NodeSet;
use crate::planner::{self, PlanMode, ReconcilePlan};
use crate::restart::{RestartCoordinator, RestartReport};
use crate::selector::{self, SelectionStrategy};
use crate::store::{DeleteAck, OverrideStore, WriteAck};

/// Phases an operation moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    DryRunPreview,
    Executing,
    RestartPending,
    Done,
}

impl Phase {
    /// Human-readable description of the phase.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Planning => "Resolving targets and planning changes",
            Self::DryRunPreview => "Previewing changes (dry run)",
            Self::Executing => "Applying changes to the override ConfigMap",
            Self::RestartPending => "Restarting OVN pods on affected nodes",
            Self::Done => "Done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// What the operation should do to the override document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OperationMode {
    Apply { levels: LogLevels },
    Revert,
}

/// A fully parsed user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub mode: OperationMode,
    pub selection: SelectionInput,
    pub location: DocumentLocation,
    pub dry_run: bool,
    pub restart_pods: bool,
}

impl OperationRequest {
    /// Enable `levels` on the nodes chosen by `selection`.
    #[must_use]
    pub fn apply(levels: LogLevels, selection: SelectionInput) -> Self {
        Self {
            mode: OperationMode::Apply { levels },
            selection,
            location: DocumentLocation::default(),
            dry_run: false,
            restart_pods: false,
        }
    }

    /// Remove debug configuration. `selection` only supplies the restart pattern.
    #[must_use]
    pub fn revert(selection: SelectionInput) -> Self {
        Self {
            mode: OperationMode::Revert,
            selection,
            location: DocumentLocation::default(),
            dry_run: false,
            restart_pods: false,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: DocumentLocation) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_restart(mut self, restart_pods: bool) -> Self {
        self.restart_pods = restart_pods;
        self
    }

    #[must_use]
    pub fn plan_mode(&self) -> PlanMode {
        match self.mode {
            OperationMode::Apply { .. } => PlanMode::Apply,
            OperationMode::Revert => PlanMode::Revert,
        }
    }

    /// Pattern used to find pods to restart.
    #[must_use]
    pub fn restart_pattern(&self) -> &str {
        if self.selection.pod_pattern.is_empty() {
            DEFAULT_POD_PATTERN
        } else {
            &self.selection.pod_pattern
        }
    }

    /// Reject contradictory input before anything touches the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.mode == OperationMode::Revert && self.selection.all_nodes {
            return Err(Error::config(
                "--all-nodes cannot be combined with --revert; revert always targets the nodes in the ConfigMap",
            ));
        }
        if self.location.namespace.is_empty() || self.location.name.is_empty() {
            return Err(Error::config("Namespace and ConfigMap name must not be empty"));
        }
        Ok(())
    }
}

/// How the override document was changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// Dry run; nothing was sent.
    Skipped,
    /// The stored document already matched the plan.
    Unchanged,
    Written { ack: WriteAck, attempts: u32 },
    Deleted { attempts: u32 },
    /// Revert found no document to delete.
    AlreadyAbsent,
}

/// Result of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub mode: PlanMode,
    pub dry_run: bool,
    pub location: DocumentLocation,
    /// Node selection strategy used (apply only).
    pub strategy: Option<SelectionStrategy>,
    pub plan: ReconcilePlan,
    pub mutation: MutationOutcome,
    pub restart: Option<RestartReport>,
    /// Pods a dry run would have restarted.
    pub would_restart: Vec<PodInfo>,
    pub phases: Vec<Phase>,
    pub finished_at: DateTime<Utc>,
}

impl OperationSummary {
    /// True if some pod restarts failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.restart.as_ref().is_some_and(RestartReport::is_partial)
    }
}

/// Runs operations against a cluster.
pub struct OperationExecutor<'a> {
    cluster: &'a dyn ClusterClient,
    config: ExecutorConfig,
}

impl<'a> OperationExecutor<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterClient, config: ExecutorConfig) -> Self {
        Self { cluster, config }
    }

    /// Run `request` to completion.
    ///
    /// # Errors
    ///
    /// Returns configuration, selection, namespace and cluster errors from
    /// planning, and [`Error::Conflict`] once conflict retries are exhausted.
    /// Pod restart failures are reported in the summary instead.
    pub async fn run(&self, request: &OperationRequest) -> Result<OperationSummary> {
        let mut phases = Vec::new();
        enter(&mut phases, Phase::Planning);
        request.validate()?;

        let namespace = &request.location.namespace;
        if !self.cluster.namespace_exists(namespace).await? {
            return Err(Error::NamespaceNotFound(namespace.clone()));
        }

        let store = OverrideStore::new(self.cluster, request.location.clone());
        let (strategy, targets) = match request.mode {
            OperationMode::Apply { .. } => {
                let strategy = SelectionStrategy::for_input(&request.selection);
                let nodes = selector::resolve(&request.selection, self.cluster, true).await?;
                (Some(strategy), Some(nodes))
            }
            OperationMode::Revert => (None, None),
        };
        let current = store.read().await?;
        let plan = self.plan(request, current, targets.as_ref())?;
        let coordinator = RestartCoordinator::new(self.cluster, &self.config);

        if request.dry_run {
            enter(&mut phases, Phase::DryRunPreview);
            let would_restart = if request.restart_pods {
                coordinator
                    .targets(&plan.affected_nodes, request.restart_pattern())
                    .await?
                    .pods()
                    .into_iter()
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            enter(&mut phases, Phase::Done);
            return Ok(OperationSummary {
                mode: plan.mode,
                dry_run: true,
                location: request.location.clone(),
                strategy,
                plan,
                mutation: MutationOutcome::Skipped,
                restart: None,
                would_restart,
                phases,
                finished_at: Utc::now(),
            });
        }

        enter(&mut phases, Phase::Executing);
        let (mutation, plan) = self.execute(&store, request, plan, targets.as_ref()).await?;

        let restart = if request.restart_pods && !plan.affected_nodes.is_empty() {
            enter(&mut phases, Phase::RestartPending);
            let report = coordinator
                .restart(&plan.affected_nodes, request.restart_pattern())
                .await?;
            if report.is_partial() {
                warn!(
                    failed = report.failed_count(),
                    "Some pods were not restarted; the ConfigMap change stays in place"
                );
            }
            Some(report)
        } else {
            None
        };

        enter(&mut phases, Phase::Done);
        Ok(OperationSummary {
            mode: plan.mode,
            dry_run: false,
            location: request.location.clone(),
            strategy,
            plan,
            mutation,
            restart,
            would_restart: Vec::new(),
            phases,
            finished_at: Utc::now(),
        })
    }

    fn plan(
        &self,
        request: &OperationRequest,
        current: Option<OverrideDocument>,
        targets: Option<&NodeSet>,
    ) -> Result<ReconcilePlan> {
        match (request.mode, targets) {
            (OperationMode::Apply { levels }, Some(nodes)) => {
                planner::plan_apply(current, &request.location, nodes, levels)
            }
            (OperationMode::Apply { .. }, None) => Err(Error::Selection(
                "apply requires a resolved node set".into(),
            )),
            (OperationMode::Revert, _) => Ok(planner::plan_revert(current)),
        }
    }

    /// Write or delete, re-reading and re-planning after each conflict.
    async fn execute(
        &self,
        store: &OverrideStore<'_>,
        request: &OperationRequest,
        mut plan: ReconcilePlan,
        targets: Option<&NodeSet>,
    ) -> Result<(MutationOutcome, ReconcilePlan)> {
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let result = match plan.mode {
                PlanMode::Apply => match plan.to_write.as_ref() {
                    Some(document) if !plan.is_noop() => store
                        .write(document)
                        .await
                        .map(|ack| MutationOutcome::Written { ack, attempts }),
                    _ => {
                        info!(location = %store.location(), "ConfigMap already up to date");
                        Ok(MutationOutcome::Unchanged)
                    }
                },
                PlanMode::Revert if plan.delete_document => {
                    store
                        .delete(plan.base_version())
                        .await
                        .map(|ack| match ack {
                            DeleteAck::Deleted => MutationOutcome::Deleted { attempts },
                            DeleteAck::NotFound => MutationOutcome::AlreadyAbsent,
                        })
                }
                PlanMode::Revert => {
                    info!(location = %store.location(), "No debug configuration to revert");
                    Ok(MutationOutcome::AlreadyAbsent)
                }
            };

            match result {
                Ok(outcome) => return Ok((outcome, plan)),
                Err(e) if e.is_conflict() && attempts <= self.config.conflict_retries => {
                    warn!(
                        attempt = attempts,
                        error = %e,
                        "ConfigMap changed concurrently, re-reading and re-planning"
                    );
                    let current = store.read().await?;
                    plan = self.plan(request, current, targets)?;
                }
                Err(e) if e.is_conflict() => {
                    let DocumentLocation { namespace, name } = store.location().clone();
                    return Err(Error::Conflict {
                        namespace,
                        name,
                        attempts,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn enter(phases: &mut Vec<Phase>, phase: Phase) {
    info!(phase = ?phase, "{}", phase.description());
    phases.push(phase);
}
