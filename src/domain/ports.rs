//! Domain Ports - Boundary between the rollover engine and the cluster
//!
//! The engine only issues the queries and mutations named here. Adapters
//! implement [`ResourceClient`] against a real control plane or in memory.

use crate::domain::model::{
    BackendInstance, EngineBinding, NodeUsage, PodUsage, RolloutStatus, VolumeAttachment,
    Workload, WorkloadOwner,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Resource Client Port
// =============================================================================

/// Port for control-plane queries, mutations and usage sampling
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Verify the control plane and the storage backend's APIs are reachable
    async fn check_dependencies(&self) -> Result<()>;

    /// List every volume with its attachment state and reported consumers
    async fn list_volume_attachments(&self) -> Result<Vec<VolumeAttachment>>;

    /// List which backend instance serves each volume's engine
    async fn list_engine_bindings(&self) -> Result<Vec<EngineBinding>>;

    /// List backend-instance inventory (usage fields left empty)
    async fn list_backend_instances(&self) -> Result<Vec<BackendInstance>>;

    /// Owner references of an intermediate (replica-set) resource
    async fn owner_references(&self, namespace: &str, name: &str) -> Result<Vec<WorkloadOwner>>;

    /// Desired replica count, `None` when the spec leaves it unset
    async fn get_replicas(&self, workload: &Workload) -> Result<Option<i32>>;

    /// Set the desired replica count
    async fn scale(&self, workload: &Workload, replicas: i32) -> Result<()>;

    /// Trigger a rolling restart
    async fn restart(&self, workload: &Workload) -> Result<()>;

    /// Rollout status, waiting up to `wait` for the rollout to finish
    async fn rollout_status(&self, workload: &Workload, wait: Duration) -> Result<RolloutStatus>;

    /// Usage of the backend-instance pods
    async fn pod_usage(&self) -> Result<Vec<PodUsage>>;

    /// Usage of every cluster node
    async fn node_usage(&self) -> Result<Vec<NodeUsage>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ResourceClientRef = Arc<dyn ResourceClient>;
