//! Orchestration Loop
//!
//! Discovers Longhorn-attached workloads, classifies them, prints the plan
//! and then, only when execution is requested, cycles the selected
//! workloads strictly one at a time.

use crate::domain::model::Workload;
use crate::domain::ports::ResourceClientRef;
use crate::error::Result;
use crate::exporter::RolloverMetrics;
use crate::rollover::clock::ClockRef;
use crate::rollover::console::Console;
use crate::rollover::dashboard::{DashboardConfig, MetricsAggregator};
use crate::rollover::executor::{ExecutorConfig, RolloverExecutor, RolloverOutcome, Strategy};
use crate::rollover::plan::{build_plans, BackendIndex, PlanFilter, WorkloadPlan};
use crate::rollover::resolver::{discover_workload_volumes, OwnershipCache};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Run-level settings
#[derive(Debug, Clone)]
pub struct RolloverConfig {
    /// Only consider volumes attached on this node
    pub node: Option<String>,
    pub filter: PlanFilter,
    pub strategy: Strategy,
    /// Leave already-migrated workloads alone
    pub skip_migrated: bool,
    /// Apply mutations; otherwise only report
    pub execute: bool,
    pub continue_on_error: bool,
    /// Image substring identifying the replacement instance-manager
    pub marker: String,
    pub executor: ExecutorConfig,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            node: None,
            filter: PlanFilter::default(),
            strategy: Strategy::Bounce,
            skip_migrated: true,
            execute: false,
            continue_on_error: false,
            marker: "hotfix".to_string(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl RolloverConfig {
    pub fn dashboard(&self) -> DashboardConfig {
        DashboardConfig {
            target_node: self.node.clone(),
            marker: self.marker.clone(),
        }
    }
}

// =============================================================================
// Report
// =============================================================================

/// A workload whose rollover failed
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadFailure {
    pub workload: Workload,
    pub message: String,
}

/// Summary of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Plans that passed the filters
    pub matched: Vec<WorkloadPlan>,
    pub selected: Vec<Workload>,
    pub skipped: Vec<Workload>,
    pub completed: Vec<RolloverOutcome>,
    pub failures: Vec<WorkloadFailure>,
    /// Whether mutations were allowed
    pub executed: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    config: RolloverConfig,
    client: ResourceClientRef,
    console: Console,
    dashboard: Arc<MetricsAggregator>,
    executor: RolloverExecutor,
    metrics: Option<Arc<RolloverMetrics>>,
}

impl Orchestrator {
    pub fn new(
        config: RolloverConfig,
        client: ResourceClientRef,
        clock: ClockRef,
        console: Console,
        metrics: Option<Arc<RolloverMetrics>>,
    ) -> Self {
        let mut dashboard = MetricsAggregator::new(client.clone(), config.dashboard(), console.clone());
        if let Some(metrics) = &metrics {
            dashboard = dashboard.with_metrics(metrics.clone());
        }
        let dashboard = Arc::new(dashboard);

        let executor = RolloverExecutor::new(
            client.clone(),
            clock,
            dashboard.clone(),
            console.clone(),
            config.executor,
        );

        Self {
            config,
            client,
            console,
            dashboard,
            executor,
            metrics,
        }
    }

    pub fn config(&self) -> &RolloverConfig {
        &self.config
    }

    /// Discover, classify and filter; no mutations
    pub async fn plan(&self) -> Result<Vec<WorkloadPlan>> {
        let mut cache = OwnershipCache::new();
        let discovery =
            discover_workload_volumes(self.client.as_ref(), self.config.node.as_deref(), &mut cache)
                .await?;
        let index = BackendIndex::load(self.client.as_ref()).await?;
        let plans = build_plans(&discovery.workloads, &index, &self.config.marker);

        info!(
            discovered = plans.len(),
            guessed = discovery.stats.guessed,
            unresolved = discovery.stats.unresolved,
            "Built workload plans"
        );
        Ok(self.config.filter.apply(plans))
    }

    /// Execute one full run
    pub async fn run(&self) -> Result<RunReport> {
        self.client.check_dependencies().await?;

        let plans = self.plan().await?;
        let mut report = RunReport {
            executed: self.config.execute,
            ..Default::default()
        };

        if plans.is_empty() {
            self.console
                .line("No matching Longhorn-attached workloads found.");
            self.dashboard.render("Current Longhorn State").await?;
            return Ok(report);
        }

        for plan in &plans {
            if plan.migrated && self.config.skip_migrated {
                report.skipped.push(plan.workload.clone());
            } else {
                report.selected.push(plan.workload.clone());
            }
        }

        self.console
            .line(format!("Matched {} workload(s):", plans.len()));
        for (idx, plan) in plans.iter().enumerate() {
            let prefix = if plan.migrated && self.config.skip_migrated {
                "SKIP"
            } else {
                "RUN "
            };
            self.console.line(format!(
                "  {:>2}. [{}] {} {}",
                idx + 1,
                prefix,
                plan.workload.namespace,
                plan.workload.reference()
            ));
        }
        report.matched = plans;

        self.dashboard.render("Pre-Run Metrics").await?;

        if !self.config.execute {
            if !report.skipped.is_empty() {
                self.console.line(format!(
                    "\nWill auto-skip {} workload(s) already migrated to {}.",
                    report.skipped.len(),
                    self.config.marker
                ));
            }
            self.console
                .line("\nDry-run mode. Re-run with --execute to apply restarts.");
            return Ok(report);
        }

        if report.selected.is_empty() {
            self.console
                .line("\nAll matched workloads are already migrated; nothing to do.");
            self.dashboard.render("Post-Run Metrics").await?;
            self.record_skipped(&report);
            return Ok(report);
        }

        self.cycle_selected(&mut report).await;

        if let Err(e) = self.dashboard.render("Post-Run Metrics").await {
            warn!(error = %e, "Failed to render post-run metrics");
        }
        self.record_skipped(&report);

        if !report.failures.is_empty() {
            self.console.line("\nFailures:");
            for failure in &report.failures {
                self.console.line(format!(
                    "  - {} {}: {}",
                    failure.workload.namespace,
                    failure.workload.reference(),
                    failure.message
                ));
            }
            return Ok(report);
        }

        if !report.skipped.is_empty() {
            self.console.line(format!(
                "\nSkipped {} workload(s) already migrated.",
                report.skipped.len()
            ));
        }
        self.console
            .line("\nAll requested workloads processed successfully.");
        Ok(report)
    }

    /// Process selected workloads one at a time
    async fn cycle_selected(&self, report: &mut RunReport) {
        let total = report.selected.len();

        for (idx, workload) in report.selected.iter().enumerate() {
            self.console.line(format!(
                "\n## [{}/{}] {} {}",
                idx + 1,
                total,
                workload.namespace,
                workload.reference()
            ));

            match self.executor.execute(workload, self.config.strategy).await {
                Ok(outcome) => {
                    self.record("completed");
                    report.completed.push(outcome);
                }
                Err(e) => {
                    error!(
                        workload = %workload,
                        scope = ?e.scope(),
                        error = %e,
                        "Workload rollover failed"
                    );
                    self.console.line(format!("ERROR: {}", e));
                    self.record("failed");
                    report.failures.push(WorkloadFailure {
                        workload: workload.clone(),
                        message: e.to_string(),
                    });

                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        }
    }

    fn record_skipped(&self, report: &RunReport) {
        for _ in &report.skipped {
            self.record("skipped");
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FakeCluster, Mutation};
    use crate::domain::model::{
        BackendInstance, RolloutStatus, VolumeAttachment, WorkloadKind, WorkloadOwner,
    };
    use crate::rollover::clock::ManualClock;
    use crate::rollover::console::ConsoleBuffer;

    fn attachment(volume: &str, node: &str, owner: &str) -> VolumeAttachment {
        VolumeAttachment {
            volume: volume.to_string(),
            state: VolumeAttachment::ATTACHED.to_string(),
            current_node: Some(node.to_string()),
            namespace: Some("ns1".to_string()),
            owners: vec![WorkloadOwner::new("Deployment", owner)],
        }
    }

    fn instance(name: &str, image: &str) -> BackendInstance {
        BackendInstance {
            name: name.to_string(),
            node: "n1".to_string(),
            image: image.to_string(),
            engines: 1,
            replicas: 1,
            cpu: None,
            memory: None,
        }
    }

    /// `api` on the old image, `web` already on the replacement
    fn cluster() -> FakeCluster {
        FakeCluster::new()
            .with_attachment(attachment("v1", "n1", "api"))
            .with_attachment(attachment("v2", "n1", "web"))
            .with_engine("v1", "im-old")
            .with_engine("v2", "im-new")
            .with_instance(instance("im-old", "longhornio/longhorn-instance-manager:v1.6.1"))
            .with_instance(instance(
                "im-new",
                "longhornio/longhorn-instance-manager:v1.6.1-hotfix-1",
            ))
    }

    fn orchestrator(cluster: FakeCluster, config: RolloverConfig) -> (Arc<FakeCluster>, Orchestrator, ConsoleBuffer) {
        let cluster = Arc::new(cluster);
        let (console, buffer) = Console::buffer();
        let orchestrator = Orchestrator::new(
            config,
            cluster.clone(),
            ManualClock::new(),
            console,
            None,
        );
        (cluster, orchestrator, buffer)
    }

    fn api() -> Workload {
        Workload::new("ns1", WorkloadKind::Deployment, "api")
    }

    fn web() -> Workload {
        Workload::new("ns1", WorkloadKind::Deployment, "web")
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_mutations() {
        let (cluster, orchestrator, output) = orchestrator(cluster(), RolloverConfig::default());

        let report = orchestrator.run().await.unwrap();

        assert!(report.is_success());
        assert!(!report.executed);
        assert_eq!(report.selected, vec![api()]);
        assert_eq!(report.skipped, vec![web()]);
        assert!(cluster.mutations().is_empty());

        let output = output.contents();
        assert!(output.starts_with("Matched 2 workload(s):\n   1. [RUN ] ns1 deploy/api\n   2. [SKIP] ns1 deploy/web\n"));
        assert!(output.contains("=== Pre-Run Metrics ==="));
        assert!(output.contains("Will auto-skip 1 workload(s) already migrated to hotfix."));
        assert!(output.ends_with("\nDry-run mode. Re-run with --execute to apply restarts.\n"));
    }

    #[tokio::test]
    async fn test_no_skip_migrated_selects_everything() {
        let config = RolloverConfig {
            skip_migrated: false,
            execute: true,
            ..Default::default()
        };
        let (cluster, orchestrator, output) = orchestrator(cluster(), config);

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.selected, vec![api(), web()]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.completed.len(), 2);
        assert_eq!(cluster.mutations().len(), 4);
        assert!(output.contents().contains("   2. [RUN ] ns1 deploy/web"));
    }

    #[tokio::test]
    async fn test_empty_plan_renders_current_state() {
        let (_, orchestrator, output) = orchestrator(FakeCluster::new(), RolloverConfig::default());

        let report = orchestrator.run().await.unwrap();

        assert!(report.is_success());
        assert!(report.matched.is_empty());
        let output = output.contents();
        assert!(output.starts_with("No matching Longhorn-attached workloads found.\n"));
        assert!(output.contains("=== Current Longhorn State ==="));
    }

    #[tokio::test]
    async fn test_everything_migrated_is_a_no_op() {
        let config = RolloverConfig {
            execute: true,
            filter: PlanFilter {
                include: Some(regex::Regex::new("^web$").unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (cluster, orchestrator, output) = orchestrator(cluster(), config);

        let report = orchestrator.run().await.unwrap();

        assert!(report.is_success());
        assert!(cluster.mutations().is_empty());
        let output = output.contents();
        assert!(output.contains("All matched workloads are already migrated; nothing to do."));
        assert!(output.contains("=== Post-Run Metrics ==="));
    }

    fn failing_cluster() -> FakeCluster {
        FakeCluster::new()
            .with_attachment(attachment("v1", "n1", "api"))
            .with_attachment(attachment("v3", "n1", "worker"))
            .with_engine("v1", "im-old")
            .with_engine("v3", "im-old")
            .with_instance(instance("im-old", "longhornio/longhorn-instance-manager:v1.6.1"))
            .with_failing_workload(&api())
    }

    #[tokio::test]
    async fn test_failure_aborts_by_default() {
        let config = RolloverConfig {
            execute: true,
            strategy: Strategy::Restart,
            ..Default::default()
        };
        let (cluster, orchestrator, output) = orchestrator(failing_cluster(), config);

        let report = orchestrator.run().await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert!(report.completed.is_empty());
        assert!(cluster.mutations().is_empty());

        let output = output.contents();
        assert!(output.contains("\n## [1/2] ns1 deploy/api\n"));
        assert!(!output.contains("## [2/2]"));
        assert!(output.contains("ERROR: restart failed for deploy/api: injected failure"));
        assert!(output.contains("=== Post-Run Metrics ==="));
        assert!(output.contains("\nFailures:\n  - ns1 deploy/api: restart failed for deploy/api: injected failure\n"));
    }

    #[tokio::test]
    async fn test_continue_on_error_processes_the_rest() {
        let worker = Workload::new("ns1", WorkloadKind::Deployment, "worker");
        let config = RolloverConfig {
            execute: true,
            continue_on_error: true,
            strategy: Strategy::Restart,
            ..Default::default()
        };
        let cluster = failing_cluster().with_rollout(
            &worker,
            vec![RolloutStatus::complete("deployment \"worker\" successfully rolled out")],
        );
        let (cluster, orchestrator, output) = orchestrator(cluster, config);

        let report = orchestrator.run().await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures[0].workload, api());
        assert_eq!(report.completed.len(), 1);
        assert_eq!(cluster.mutations(), vec![Mutation::Restart(worker)]);
        assert!(output.contents().contains("## [2/2] ns1 deploy/worker"));
    }

    #[tokio::test]
    async fn test_metrics_count_outcomes() {
        let metrics = Arc::new(RolloverMetrics::new().unwrap());
        let config = RolloverConfig {
            execute: true,
            ..Default::default()
        };
        let (console, _) = Console::buffer();
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(cluster()),
            ManualClock::new(),
            console,
            Some(metrics.clone()),
        );

        let report = orchestrator.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(metrics.workloads_total("completed"), 1);
        assert_eq!(metrics.workloads_total("skipped"), 1);
        assert!(metrics
            .encode()
            .unwrap()
            .contains("longhorn_rollover_engines{generation=\"new\"} 1"));
    }
}
