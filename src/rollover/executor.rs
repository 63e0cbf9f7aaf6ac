//! Rollover Executor
//!
//! Cycles one workload so its pods reattach their volumes through the
//! replacement instance-managers. Two strategies:
//!
//! ```text
//! restart: Issued ──▶ Polling ──▶ Completed | TimedOut
//!
//! bounce:  ReadReplicas ──▶ ScaledDown ──▶ [DownWait] ──▶ ScalingUp ──▶ Completed | TimedOut
//! ```
//!
//! DaemonSets cannot be scaled to zero and always take the restart path.
//! Neither strategy retries; a failure is returned to the caller.

use crate::domain::model::{RolloutStatus, Workload};
use crate::domain::ports::ResourceClientRef;
use crate::error::{Error, Result};
use crate::rollover::clock::ClockRef;
use crate::rollover::console::Console;
use crate::rollover::dashboard::MetricsAggregator;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TIMEOUT_FALLBACK: &str = "timeout waiting for rollout";
const COMPLETE_FALLBACK: &str = "rollout complete";

// =============================================================================
// Configuration
// =============================================================================

/// How a workload is cycled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Rolling restart via the pod-template annotation
    #[value(alias = "rollout")]
    Restart,
    /// Scale to zero and back, forcing detach and reattach
    Bounce,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Restart => "restart",
            Strategy::Bounce => "bounce",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing for a single workload
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Wall-clock limit for each wait, measured from the mutation
    pub timeout: Duration,
    /// Pause between rollout polls
    pub interval: Duration,
    /// Bounded wait of one rollout-status query
    pub poll_timeout: Duration,
    /// Settle delay between scale-down and scale-up
    pub down_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            interval: Duration::from_secs(15),
            poll_timeout: Duration::from_secs(5),
            down_wait: Duration::from_secs(20),
        }
    }
}

// =============================================================================
// Phases and Outcome
// =============================================================================

/// Executor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Issued,
    Polling,
    ReadReplicas,
    ScaledDown,
    DownWait,
    ScalingUp,
    Completed,
    TimedOut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Issued => "issued",
            Phase::Polling => "polling",
            Phase::ReadReplicas => "read-replicas",
            Phase::ScaledDown => "scaled-down",
            Phase::DownWait => "down-wait",
            Phase::ScalingUp => "scaling-up",
            Phase::Completed => "completed",
            Phase::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Result of a successfully cycled workload
#[derive(Debug, Clone, Serialize)]
pub struct RolloverOutcome {
    pub workload: Workload,
    /// Strategy actually applied
    pub strategy: Strategy,
    /// Replica count restored by a bounce
    pub original_replicas: Option<i32>,
    /// Last line of the final rollout status
    pub message: String,
    /// Rollout polls issued in the final wait
    pub polls: u32,
    /// Phases entered, in order
    pub phases: Vec<Phase>,
}

/// What a poll loop is waiting for; drives dashboard headers
#[derive(Debug, Clone, Copy)]
enum PollTarget {
    Restart,
    ScaleUp,
}

impl PollTarget {
    fn header(&self, workload: &Workload, elapsed: Duration) -> String {
        match self {
            PollTarget::Restart => format!("{} | t+{}s", workload.reference(), elapsed.as_secs()),
            PollTarget::ScaleUp => {
                format!("{} scale-up | t+{}s", workload.reference(), elapsed.as_secs())
            }
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Drives a single workload through the selected strategy
pub struct RolloverExecutor {
    client: ResourceClientRef,
    clock: ClockRef,
    dashboard: Arc<MetricsAggregator>,
    console: Console,
    config: ExecutorConfig,
}

impl RolloverExecutor {
    pub fn new(
        client: ResourceClientRef,
        clock: ClockRef,
        dashboard: Arc<MetricsAggregator>,
        console: Console,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            clock,
            dashboard,
            console,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Strategy applied to `workload` when `requested` is selected
    pub fn effective_strategy(workload: &Workload, requested: Strategy) -> Strategy {
        if workload.kind.is_scalable() {
            requested
        } else {
            Strategy::Restart
        }
    }

    /// Cycle one workload
    pub async fn execute(&self, workload: &Workload, requested: Strategy) -> Result<RolloverOutcome> {
        let strategy = Self::effective_strategy(workload, requested);
        if strategy != requested {
            debug!(
                workload = %workload,
                "Workload cannot scale to zero, using rolling restart"
            );
        }

        let outcome = match strategy {
            Strategy::Restart => self.restart(workload).await?,
            Strategy::Bounce => self.bounce(workload).await?,
        };

        info!(
            workload = %workload,
            strategy = %outcome.strategy,
            polls = outcome.polls,
            "Workload rollover complete"
        );
        Ok(outcome)
    }

    async fn restart(&self, workload: &Workload) -> Result<RolloverOutcome> {
        let mut phases = Vec::new();

        self.console
            .line(format!("\n-- Restarting {} {}", workload.namespace, workload.reference()));
        self.client.restart(workload).await?;
        self.enter(workload, &mut phases, Phase::Issued);

        let (message, polls) = self
            .poll_until_ready(workload, PollTarget::Restart, &mut phases)
            .await?;

        Ok(RolloverOutcome {
            workload: workload.clone(),
            strategy: Strategy::Restart,
            original_replicas: None,
            message,
            polls,
            phases,
        })
    }

    async fn bounce(&self, workload: &Workload) -> Result<RolloverOutcome> {
        let mut phases = Vec::new();
        let reference = workload.reference();

        self.enter(workload, &mut phases, Phase::ReadReplicas);
        let original = self.client.get_replicas(workload).await?.unwrap_or(1);

        self.console.line(format!(
            "\n-- Bounce {} {} (replicas {} -> 0 -> {})",
            workload.namespace, reference, original, original
        ));
        self.client.scale(workload, 0).await?;
        self.await_scale_down(workload).await?;
        self.enter(workload, &mut phases, Phase::ScaledDown);
        self.show(&format!("{} scaled to 0", reference)).await;

        if !self.config.down_wait.is_zero() {
            self.enter(workload, &mut phases, Phase::DownWait);
            self.console.line(format!(
                "Waiting {}s for detach to settle...",
                self.config.down_wait.as_secs()
            ));
            self.clock.sleep(self.config.down_wait).await;
            self.show(&format!("{} detach wait complete", reference)).await;
        }

        self.client.scale(workload, original).await?;
        self.enter(workload, &mut phases, Phase::ScalingUp);

        let (message, polls) = self
            .poll_until_ready(workload, PollTarget::ScaleUp, &mut phases)
            .await?;

        Ok(RolloverOutcome {
            workload: workload.clone(),
            strategy: Strategy::Bounce,
            original_replicas: Some(original),
            message,
            polls,
            phases,
        })
    }

    /// Block until the scale-down is observed, bounded by the run timeout
    async fn await_scale_down(&self, workload: &Workload) -> Result<()> {
        let status = self
            .client
            .rollout_status(workload, self.config.timeout)
            .await
            .map_err(|e| Error::RolloutFailed {
                workload: workload.reference(),
                detail: e.to_string(),
            })?;

        if status.done {
            Ok(())
        } else {
            Err(Error::RolloutFailed {
                workload: workload.reference(),
                detail: detail_or(&status.message, "scale-down did not complete"),
            })
        }
    }

    /// Poll rollout status until it succeeds or the timeout elapses
    async fn poll_until_ready(
        &self,
        workload: &Workload,
        target: PollTarget,
        phases: &mut Vec<Phase>,
    ) -> Result<(String, u32)> {
        let start = self.clock.now();
        let mut polls = 0u32;
        self.enter(workload, phases, Phase::Polling);

        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            let status = self.poll_once(workload).await;
            polls += 1;

            self.show(&target.header(workload, elapsed)).await;

            if status.done {
                let message = last_line(&status.message).unwrap_or(COMPLETE_FALLBACK).to_string();
                self.console.line(format!("Completed: {}", message));
                self.enter(workload, phases, Phase::Completed);
                return Ok((message, polls));
            }

            if self.clock.now().saturating_sub(start) > self.config.timeout {
                self.enter(workload, phases, Phase::TimedOut);
                return Err(Error::RolloutTimeout {
                    workload: workload.reference(),
                    detail: detail_or(&status.message, TIMEOUT_FALLBACK),
                });
            }

            self.clock.sleep(self.config.interval).await;
        }
    }

    /// One bounded status query; query errors count as not-yet-ready
    async fn poll_once(&self, workload: &Workload) -> RolloutStatus {
        match self
            .client
            .rollout_status(workload, self.config.poll_timeout)
            .await
        {
            Ok(status) => status,
            Err(e) if e.is_transient() => {
                debug!(workload = %workload, error = %e, "Rollout status query failed, retrying");
                RolloutStatus::pending(e.to_string())
            }
            Err(e) => {
                warn!(workload = %workload, error = %e, "Rollout status unavailable");
                RolloutStatus::pending(e.to_string())
            }
        }
    }

    /// Render the dashboard; failures only cost the display
    async fn show(&self, header: &str) {
        if let Err(e) = self.dashboard.render(header).await {
            warn!(header, error = %e, "Failed to render metrics snapshot");
        }
    }

    fn enter(&self, workload: &Workload, phases: &mut Vec<Phase>, phase: Phase) {
        debug!(workload = %workload, phase = %phase, "Executor phase");
        phases.push(phase);
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.trim().lines().last().filter(|l| !l.is_empty())
}

fn detail_or(message: &str, fallback: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
