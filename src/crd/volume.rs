//! Longhorn Volume CRD
//!
//! Read-only view of `volumes.longhorn.io`: attachment state, the node the
//! volume is attached to, and the workloads Longhorn reports as consumers.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::model::{VolumeAttachment, WorkloadOwner};

// =============================================================================
// Volume CRD
// =============================================================================

/// A Longhorn block volume
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "Volume",
    plural = "volumes",
    shortname = "lhv",
    status = "VolumeStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Requested size
    #[serde(default)]
    pub size: Option<String>,

    #[serde(default)]
    pub number_of_replicas: Option<i64>,
}

/// Observed volume state
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStatus {
    /// `attached`, `detached`, `attaching`, ...
    #[serde(default)]
    pub state: String,

    #[serde(default, rename = "currentNodeID")]
    pub current_node_id: Option<String>,

    #[serde(default)]
    pub kubernetes_status: KubernetesStatus,
}

/// Kubernetes-side view of the volume maintained by Longhorn
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesStatus {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub pvc_name: Option<String>,

    /// Null in the API when no pod uses the volume
    #[serde(default)]
    pub workloads_status: Option<Vec<WorkloadStatus>>,
}

/// One pod consuming the volume and its declared owner
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub pod_name: String,

    #[serde(default)]
    pub pod_status: String,

    #[serde(default)]
    pub workload_name: String,

    #[serde(default)]
    pub workload_type: String,
}

impl Volume {
    /// Convert to the domain attachment record
    pub fn to_attachment(&self) -> VolumeAttachment {
        let status = self.status.clone().unwrap_or_default();
        let kubernetes = status.kubernetes_status;

        VolumeAttachment {
            volume: self.name_any(),
            state: status.state,
            current_node: status.current_node_id.filter(|node| !node.is_empty()),
            namespace: kubernetes.namespace.filter(|ns| !ns.is_empty()),
            owners: kubernetes
                .workloads_status
                .unwrap_or_default()
                .into_iter()
                .map(|ws| WorkloadOwner::new(ws.workload_type, ws.workload_name))
                .collect(),
        }
    }
}
