//! Rollover engine
//!
//! - [`resolver`]: attached volumes → owning workloads
//! - [`plan`]: migrated/pending classification and filtering
//! - [`dashboard`]: instance-manager migration metrics
//! - [`executor`]: restart and bounce state machines
//! - [`orchestrator`]: the sequential run loop

pub mod clock;
pub mod console;
pub mod dashboard;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod resolver;

pub use clock::{Clock, ClockRef, ManualClock, TokioClock};
pub use console::{Console, ConsoleBuffer};
pub use dashboard::{DashboardConfig, MetricsAggregator, MetricsSnapshot, NodeMemory, PartitionTotals};
pub use executor::{ExecutorConfig, Phase, RolloverExecutor, RolloverOutcome, Strategy};
pub use orchestrator::{Orchestrator, RolloverConfig, RunReport, WorkloadFailure};
pub use plan::{build_plans, BackendIndex, PlanFilter, WorkloadPlan};
pub use resolver::{
    discover_workload_volumes, Discovery, DiscoveryStats, OwnershipCache, Resolution,
    WorkloadResolver,
};
