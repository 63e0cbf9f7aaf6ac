//! Kubernetes Resource Client
//!
//! Implements the [`ResourceClient`] port with kube-rs: Longhorn CRDs for
//! discovery and inventory, apps/v1 controllers for restarts and scaling,
//! and `metrics.k8s.io` for best-effort usage sampling.

use crate::cluster::quantity::{
    format_mebibytes, format_millicores, parse_cpu_millis, parse_memory_bytes,
};
use crate::cluster::rollout::RolloutView;
use crate::crd::{Engine, InstanceManager, Volume};
use crate::domain::model::{
    BackendInstance, EngineBinding, NodeUsage, PodUsage, RolloutStatus, VolumeAttachment,
    Workload, WorkloadKind, WorkloadOwner,
};
use crate::domain::ports::ResourceClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Constants
// =============================================================================

/// Annotation `kubectl rollout restart` stamps on the pod template
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

const FIELD_MANAGER: &str = "longhorn-rollover";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kubernetes client
#[derive(Debug, Clone)]
pub struct KubeClientConfig {
    /// Namespace Longhorn is installed in
    pub longhorn_namespace: String,
    /// Label selector matching instance-manager pods
    pub instance_manager_selector: String,
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self {
            longhorn_namespace: "longhorn-system".to_string(),
            instance_manager_selector: "longhorn.io/component=instance-manager".to_string(),
        }
    }
}

// =============================================================================
// Kube Resource Client
// =============================================================================

/// [`ResourceClient`] backed by a live cluster
pub struct KubeResourceClient {
    config: KubeClientConfig,
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client, config: KubeClientConfig) -> Self {
        Self { config, client }
    }

    /// Connect using the ambient kubeconfig or in-cluster service account
    pub async fn connect(config: KubeClientConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::DependencyUnavailable(format!("kubernetes client: {}", e)))?;
        Ok(Self::new(client, config))
    }

    fn longhorn<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.config.longhorn_namespace)
    }

    fn pod_metrics_api(&self) -> Api<DynamicObject> {
        let ar = metrics_resource("PodMetrics", "pods");
        Api::namespaced_with(self.client.clone(), &self.config.longhorn_namespace, &ar)
    }

    fn node_metrics_api(&self) -> Api<DynamicObject> {
        let ar = metrics_resource("NodeMetrics", "nodes");
        Api::all_with(self.client.clone(), &ar)
    }

    async fn restart_patch<K>(&self, api: Api<K>, workload: &Workload) -> Result<()>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            RESTARTED_AT_ANNOTATION: chrono::Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch(&workload.name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| mutation_error(workload, "restart", e))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn check_dependencies(&self) -> Result<()> {
        let volumes: Api<Volume> = self.longhorn();
        match volumes.list(&ListParams::default().limit(1)).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::DependencyUnavailable(
                "volumes.longhorn.io (is Longhorn installed?)".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_volume_attachments(&self) -> Result<Vec<VolumeAttachment>> {
        let api: Api<Volume> = self.longhorn();
        let volumes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::query("list volumes.longhorn.io", e))?;

        Ok(volumes.items.iter().map(Volume::to_attachment).collect())
    }

    async fn list_engine_bindings(&self) -> Result<Vec<EngineBinding>> {
        let api: Api<Engine> = self.longhorn();
        let engines = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::query("list engines.longhorn.io", e))?;

        Ok(engines.items.iter().map(Engine::to_binding).collect())
    }

    async fn list_backend_instances(&self) -> Result<Vec<BackendInstance>> {
        let api: Api<InstanceManager> = self.longhorn();
        let managers = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::query("list instancemanagers.longhorn.io", e))?;

        Ok(managers
            .items
            .iter()
            .map(InstanceManager::to_backend_instance)
            .collect())
    }

    async fn owner_references(&self, namespace: &str, name: &str) -> Result<Vec<WorkloadOwner>> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let rs = api
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "ReplicaSet".into(),
                name: format!("{}/{}", namespace, name),
            })?;

        Ok(rs
            .owner_references()
            .iter()
            .map(|owner| WorkloadOwner::new(owner.kind.clone(), owner.name.clone()))
            .collect())
    }

    async fn get_replicas(&self, workload: &Workload) -> Result<Option<i32>> {
        let scale = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.get_scale(&workload.name).await?
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.get_scale(&workload.name).await?
            }
            WorkloadKind::DaemonSet => {
                return Err(Error::Configuration(format!(
                    "{} has no replica count",
                    workload.reference()
                )))
            }
        };

        Ok(scale.spec.and_then(|spec| spec.replicas))
    }

    async fn scale(&self, workload: &Workload, replicas: i32) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        let result = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.patch_scale(&workload.name, &params, &Patch::Merge(&patch)).await
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.patch_scale(&workload.name, &params, &Patch::Merge(&patch)).await
            }
            WorkloadKind::DaemonSet => {
                return Err(Error::MutationFailed {
                    workload: workload.reference(),
                    operation: "scale".into(),
                    reason: "daemon sets cannot be scaled".into(),
                })
            }
        };
        result.map_err(|e| mutation_error(workload, "scale", e))?;

        info!(
            namespace = %workload.namespace,
            workload = %workload.reference(),
            replicas,
            "Scaled workload"
        );
        Ok(())
    }

    async fn restart(&self, workload: &Workload) -> Result<()> {
        let ns = &workload.namespace;
        match workload.kind {
            WorkloadKind::Deployment => {
                self.restart_patch(Api::<Deployment>::namespaced(self.client.clone(), ns), workload)
                    .await?
            }
            WorkloadKind::StatefulSet => {
                self.restart_patch(Api::<StatefulSet>::namespaced(self.client.clone(), ns), workload)
                    .await?
            }
            WorkloadKind::DaemonSet => {
                self.restart_patch(Api::<DaemonSet>::namespaced(self.client.clone(), ns), workload)
                    .await?
            }
        }

        info!(
            namespace = %workload.namespace,
            workload = %workload.reference(),
            "Issued rolling restart"
        );
        Ok(())
    }

    async fn rollout_status(&self, workload: &Workload, wait: Duration) -> Result<RolloutStatus> {
        let ns = &workload.namespace;
        match workload.kind {
            WorkloadKind::Deployment => {
                wait_for_rollout(Api::<Deployment>::namespaced(self.client.clone(), ns), workload, wait)
                    .await
            }
            WorkloadKind::StatefulSet => {
                wait_for_rollout(Api::<StatefulSet>::namespaced(self.client.clone(), ns), workload, wait)
                    .await
            }
            WorkloadKind::DaemonSet => {
                wait_for_rollout(Api::<DaemonSet>::namespaced(self.client.clone(), ns), workload, wait)
                    .await
            }
        }
    }

    async fn pod_usage(&self) -> Result<Vec<PodUsage>> {
        let pods = self
            .pod_metrics_api()
            .list(&ListParams::default().labels(&self.config.instance_manager_selector))
            .await
            .map_err(|e| Error::query("list pod metrics", e))?;

        let mut usage = Vec::with_capacity(pods.items.len());
        for pod in &pods.items {
            let mut cpu_millis = 0.0;
            let mut memory_bytes = 0.0;
            let containers = pod
                .data
                .get("containers")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            for container in &containers {
                let (cpu, memory) = usage_pair(container.get("usage"))?;
                cpu_millis += cpu;
                memory_bytes += memory;
            }
            usage.push(PodUsage {
                name: pod.name_any(),
                cpu: format_millicores(cpu_millis),
                memory: format_mebibytes(memory_bytes),
            });
        }
        Ok(usage)
    }

    async fn node_usage(&self) -> Result<Vec<NodeUsage>> {
        let metrics = self
            .node_metrics_api()
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::query("list node metrics", e))?;

        let nodes: Api<Node> = Api::all(self.client.clone());
        let allocatable: HashMap<String, f64> = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::query("list nodes", e))?
            .items
            .iter()
            .filter_map(|node| {
                let memory = node.status.as_ref()?.allocatable.as_ref()?.get("memory")?;
                let bytes = parse_memory_bytes(&memory.0).ok()?;
                Some((node.name_any(), bytes))
            })
            .collect();

        let mut usage = Vec::with_capacity(metrics.items.len());
        for node in &metrics.items {
            let name = node.name_any();
            let (cpu, memory) = usage_pair(node.data.get("usage"))?;
            let memory_percent = match allocatable.get(&name) {
                Some(total) if *total > 0.0 => (memory * 100.0 / total) as u32,
                _ => 0,
            };
            usage.push(NodeUsage {
                name,
                cpu: format_millicores(cpu),
                memory: format_mebibytes(memory),
                memory_percent,
            });
        }
        Ok(usage)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Wait up to `wait` for the controller's rollout to finish, then report
/// the latest status
async fn wait_for_rollout<K>(api: Api<K>, workload: &Workload, wait: Duration) -> Result<RolloutStatus>
where
    K: Resource + RolloutView + Clone + DeserializeOwned + Debug + Send + 'static,
    <K as Resource>::DynamicType: Default,
{
    let condition = |obj: Option<&K>| obj.map_or(false, |o| o.rollout_status().done);
    let waited = tokio::time::timeout(
        wait,
        kube::runtime::wait::await_condition(api.clone(), &workload.name, condition),
    )
    .await;

    match waited {
        Ok(Ok(Some(obj))) => return Ok(obj.rollout_status()),
        Ok(Ok(None)) => {
            return Err(Error::ResourceNotFound {
                kind: format!("{:?}", workload.kind),
                name: format!("{}/{}", workload.namespace, workload.name),
            })
        }
        Ok(Err(e)) => {
            return Err(Error::query(
                format!("watch rollout of {}", workload.reference()),
                e,
            ))
        }
        Err(_elapsed) => debug!(workload = %workload.reference(), ?wait, "Rollout wait elapsed"),
    }

    let obj = api.get(&workload.name).await?;
    Ok(obj.rollout_status())
}

fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".to_string(),
        version: "v1beta1".to_string(),
        api_version: "metrics.k8s.io/v1beta1".to_string(),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

/// Extract (millicores, bytes) from a metrics `usage` object
fn usage_pair(usage: Option<&serde_json::Value>) -> Result<(f64, f64)> {
    let field = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("0")
            .to_string()
    };
    Ok((parse_cpu_millis(&field("cpu"))?, parse_memory_bytes(&field("memory"))?))
}

fn mutation_error(workload: &Workload, operation: &str, err: kube::Error) -> Error {
    Error::MutationFailed {
        workload: workload.reference(),
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}
