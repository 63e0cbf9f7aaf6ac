//! In-memory cluster
//!
//! A scriptable [`ResourceClient`] holding Longhorn inventory, replica-set
//! ownership and workload replica counts in memory. It records every
//! mutation and lookup, which makes discovery, dry runs and the rollover
//! state machine observable without a control plane.

use crate::domain::model::{
    BackendInstance, EngineBinding, NodeUsage, PodUsage, RolloutStatus, VolumeAttachment,
    Workload, WorkloadOwner,
};
use crate::domain::ports::ResourceClient;
use crate::error::{Error, Result};
use crate::rollover::clock::ManualClock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A mutating call issued against the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Restart(Workload),
    Scale(Workload, i32),
}

/// Scripted answers to rollout-status queries for one workload
#[derive(Debug, Clone)]
struct RolloutScript {
    queue: VecDeque<RolloutStatus>,
    fallback: RolloutStatus,
}

#[derive(Default)]
struct State {
    attachments: Vec<VolumeAttachment>,
    bindings: Vec<EngineBinding>,
    instances: Vec<BackendInstance>,
    replica_sets: HashMap<(String, String), Vec<WorkloadOwner>>,
    replicas: HashMap<Workload, Option<i32>>,
    rollouts: HashMap<Workload, RolloutScript>,
    failing: HashSet<Workload>,
    failing_queries: HashSet<String>,
    pod_usage: Option<Vec<PodUsage>>,
    node_usage: Option<Vec<NodeUsage>>,
    mutations: Vec<Mutation>,
    owner_lookups: Vec<(String, String)>,
    rollout_queries: Vec<(Workload, Duration)>,
}

/// In-memory [`ResourceClient`]
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    clock: Option<(Arc<ManualClock>, Duration)>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `clock` by `cost` on every rollout-status query
    pub fn with_clock(mut self, clock: Arc<ManualClock>, cost: Duration) -> Self {
        self.clock = Some((clock, cost));
        self
    }

    pub fn with_attachment(self, attachment: VolumeAttachment) -> Self {
        self.state.lock().attachments.push(attachment);
        self
    }

    pub fn with_engine(self, volume: &str, instance: &str) -> Self {
        self.state.lock().bindings.push(EngineBinding {
            volume: volume.to_string(),
            instance: instance.to_string(),
        });
        self
    }

    pub fn with_instance(self, instance: BackendInstance) -> Self {
        self.state.lock().instances.push(instance);
        self
    }

    pub fn with_replica_set(self, namespace: &str, name: &str, owners: Vec<WorkloadOwner>) -> Self {
        self.state
            .lock()
            .replica_sets
            .insert((namespace.to_string(), name.to_string()), owners);
        self
    }

    pub fn with_replicas(self, workload: &Workload, replicas: Option<i32>) -> Self {
        self.state.lock().replicas.insert(workload.clone(), replicas);
        self
    }

    /// Answer rollout queries for `workload` from `statuses`, then keep
    /// returning the last one
    pub fn with_rollout(self, workload: &Workload, statuses: Vec<RolloutStatus>) -> Self {
        let fallback = statuses
            .last()
            .cloned()
            .unwrap_or_else(|| completed(workload));
        self.state.lock().rollouts.insert(
            workload.clone(),
            RolloutScript {
                queue: statuses.into(),
                fallback,
            },
        );
        self
    }

    /// Make every mutation of `workload` fail
    pub fn with_failing_workload(self, workload: &Workload) -> Self {
        self.state.lock().failing.insert(workload.clone());
        self
    }

    /// Make the named port query fail, e.g. `"list_engine_bindings"`;
    /// a failing `"check_dependencies"` reports the dependency as unavailable
    pub fn with_failing_query(self, operation: &str) -> Self {
        self.state.lock().failing_queries.insert(operation.to_string());
        self
    }

    pub fn with_pod_usage(self, usage: Vec<PodUsage>) -> Self {
        self.state.lock().pod_usage = Some(usage);
        self
    }

    pub fn with_node_usage(self, usage: Vec<NodeUsage>) -> Self {
        self.state.lock().node_usage = Some(usage);
        self
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }

    pub fn owner_lookups(&self) -> Vec<(String, String)> {
        self.state.lock().owner_lookups.clone()
    }

    pub fn rollout_queries(&self) -> Vec<(Workload, Duration)> {
        self.state.lock().rollout_queries.clone()
    }

    pub fn replicas_of(&self, workload: &Workload) -> Option<i32> {
        self.state.lock().replicas.get(workload).copied().flatten()
    }

    fn query(&self, operation: &str) -> Result<()> {
        if !self.state.lock().failing_queries.contains(operation) {
            return Ok(());
        }
        if operation == "check_dependencies" {
            Err(Error::DependencyUnavailable("volumes.longhorn.io".into()))
        } else {
            Err(Error::query(operation, "injected failure"))
        }
    }

    fn mutate(&self, workload: &Workload, mutation: Mutation) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(workload) {
            return Err(Error::MutationFailed {
                workload: workload.reference(),
                operation: match mutation {
                    Mutation::Restart(_) => "restart".into(),
                    Mutation::Scale(..) => "scale".into(),
                },
                reason: "injected failure".into(),
            });
        }
        if let Mutation::Scale(_, replicas) = mutation {
            state.replicas.insert(workload.clone(), Some(replicas));
        }
        state.mutations.push(mutation);
        Ok(())
    }
}

fn completed(workload: &Workload) -> RolloutStatus {
    RolloutStatus::complete(format!("{} successfully rolled out", workload.reference()))
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn check_dependencies(&self) -> Result<()> {
        self.query("check_dependencies")
    }

    async fn list_volume_attachments(&self) -> Result<Vec<VolumeAttachment>> {
        self.query("list_volume_attachments")?;
        Ok(self.state.lock().attachments.clone())
    }

    async fn list_engine_bindings(&self) -> Result<Vec<EngineBinding>> {
        self.query("list_engine_bindings")?;
        Ok(self.state.lock().bindings.clone())
    }

    async fn list_backend_instances(&self) -> Result<Vec<BackendInstance>> {
        self.query("list_backend_instances")?;
        Ok(self.state.lock().instances.clone())
    }

    async fn owner_references(&self, namespace: &str, name: &str) -> Result<Vec<WorkloadOwner>> {
        let mut state = self.state.lock();
        state
            .owner_lookups
            .push((namespace.to_string(), name.to_string()));
        state
            .replica_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "ReplicaSet".into(),
                name: format!("{}/{}", namespace, name),
            })
    }

    async fn get_replicas(&self, workload: &Workload) -> Result<Option<i32>> {
        Ok(self.state.lock().replicas.get(workload).copied().flatten())
    }

    async fn scale(&self, workload: &Workload, replicas: i32) -> Result<()> {
        self.mutate(workload, Mutation::Scale(workload.clone(), replicas))
    }

    async fn restart(&self, workload: &Workload) -> Result<()> {
        self.mutate(workload, Mutation::Restart(workload.clone()))
    }

    async fn rollout_status(&self, workload: &Workload, wait: Duration) -> Result<RolloutStatus> {
        if let Some((clock, cost)) = &self.clock {
            clock.advance(*cost);
        }
        self.query("rollout_status")?;

        let mut state = self.state.lock();
        state.rollout_queries.push((workload.clone(), wait));
        let status = match state.rollouts.get_mut(workload) {
            Some(script) => script
                .queue
                .pop_front()
                .unwrap_or_else(|| script.fallback.clone()),
            None => completed(workload),
        };
        Ok(status)
    }

    async fn pod_usage(&self) -> Result<Vec<PodUsage>> {
        self.state
            .lock()
            .pod_usage
            .clone()
            .ok_or_else(|| Error::query("list pod metrics", "metrics API not available"))
    }

    async fn node_usage(&self) -> Result<Vec<NodeUsage>> {
        self.state
            .lock()
            .node_usage
            .clone()
            .ok_or_else(|| Error::query("list node metrics", "metrics API not available"))
    }
}
