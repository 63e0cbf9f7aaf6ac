//! Longhorn Instance-Manager Rollover
//!
//! Moves Longhorn-attached workloads off deprecated instance-managers by
//! cycling them, one at a time, while showing how engines, replicas and
//! memory shift from the old instance-manager image to the replacement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          Orchestration Loop                                  │
//! │            (filter → report → sequential execute → summary)                  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Workload     │  │      Plan       │  │      Rollover Executor      │  │
//! │  │    Resolver     │──▶     Builder     │  │   (restart | bounce, clock) │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           │                    │           ┌─────────────┴───────────────┐  │
//! │           │                    │           │     Metrics Aggregator      │  │
//! │           │                    │           │  (dashboard + Prometheus)   │  │
//! │           │                    │           └─────────────┬───────────────┘  │
//! ├───────────┴────────────────────┴─────────────────────────┴──────────────────┤
//! │                         ResourceClient port                                  │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   Kubernetes (kube-rs)      │  │        In-memory FakeCluster        │   │
//! │  │   Longhorn CRDs, metrics    │  │        (tests, benches)             │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`rollover`]: resolver, planner, dashboard, executor and run loop
//! - [`cluster`]: `ResourceClient` adapters
//! - [`crd`]: Longhorn Custom Resource Definitions
//! - [`domain`]: Core domain types and traits
//! - [`exporter`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod cluster;
pub mod crd;
pub mod domain;
pub mod error;
pub mod exporter;
pub mod rollover;

// Re-export commonly used types
pub use cluster::{FakeCluster, KubeClientConfig, KubeResourceClient, Mutation};

pub use domain::model::{
    BackendInstance, EngineBinding, NodeUsage, PodUsage, RolloutStatus, VolumeAttachment,
    Workload, WorkloadKind, WorkloadOwner,
};
pub use domain::ports::{ResourceClient, ResourceClientRef};

pub use error::{Error, FailureScope, Result};

pub use exporter::RolloverMetrics;

pub use rollover::{
    Console, DashboardConfig, ExecutorConfig, ManualClock, MetricsAggregator, Orchestrator,
    PlanFilter, Resolution, RolloverConfig, RolloverExecutor, RunReport, Strategy, TokioClock,
    WorkloadPlan,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
