//! Longhorn InstanceManager CRD
//!
//! An instance-manager is the per-node process group running engine and
//! replica processes. Its image tag tells which Longhorn build serves them.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::model::BackendInstance;

// =============================================================================
// InstanceManager CRD
// =============================================================================

/// A Longhorn instance-manager
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "InstanceManager",
    plural = "instancemanagers",
    shortname = "lhim",
    status = "InstanceManagerStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceManagerSpec {
    #[serde(default)]
    pub image: String,

    #[serde(default, rename = "nodeID")]
    pub node_id: String,

    /// `aio`, `engine` or `replica`
    #[serde(default, rename = "type")]
    pub manager_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceManagerStatus {
    #[serde(default)]
    pub current_state: String,

    /// Engine processes keyed by name
    #[serde(default)]
    pub instance_engines: Option<BTreeMap<String, serde_json::Value>>,

    /// Replica processes keyed by name
    #[serde(default)]
    pub instance_replicas: Option<BTreeMap<String, serde_json::Value>>,
}

impl InstanceManager {
    /// Convert to a backend instance without usage figures
    pub fn to_backend_instance(&self) -> BackendInstance {
        let status = self.status.as_ref();
        let count = |map: Option<&BTreeMap<String, serde_json::Value>>| map.map_or(0, BTreeMap::len);

        BackendInstance {
            name: self.name_any(),
            node: self.spec.node_id.clone(),
            image: self.spec.image.clone(),
            engines: count(status.and_then(|s| s.instance_engines.as_ref())),
            replicas: count(status.and_then(|s| s.instance_replicas.as_ref())),
            cpu: None,
            memory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_manager_counts() {
        let im: InstanceManager = serde_json::from_value(serde_json::json!({
            "apiVersion": "longhorn.io/v1beta2",
            "kind": "InstanceManager",
            "metadata": { "name": "instance-manager-3f1c", "namespace": "longhorn-system" },
            "spec": {
                "image": "longhornio/longhorn-instance-manager:v1.6.2-hotfix-1",
                "nodeID": "worker-1",
                "type": "aio"
            },
            "status": {
                "currentState": "running",
                "instanceEngines": { "pvc-1-e-0": {}, "pvc-2-e-0": {} },
                "instanceReplicas": { "pvc-1-r-1": {}, "pvc-2-r-1": {}, "pvc-3-r-2": {} }
            }
        }))
        .unwrap();

        let instance = im.to_backend_instance();
        assert_eq!(instance.name, "instance-manager-3f1c");
        assert_eq!(instance.node, "worker-1");
        assert_eq!(instance.engines, 2);
        assert_eq!(instance.replicas, 3);
        assert!(instance.is_replacement("hotfix"));
        assert_eq!(instance.version_tag(), "v1.6.2-hotfix-1");
    }

    #[test]
    fn test_instance_manager_without_status() {
        let im: InstanceManager = serde_json::from_value(serde_json::json!({
            "apiVersion": "longhorn.io/v1beta2",
            "kind": "InstanceManager",
            "metadata": { "name": "instance-manager-old" },
            "spec": { "image": "longhornio/longhorn-instance-manager:v1.6.1", "nodeID": "worker-2" }
        }))
        .unwrap();

        let instance = im.to_backend_instance();
        assert_eq!(instance.engines, 0);
        assert_eq!(instance.replicas, 0);
        assert!(!instance.is_replacement("hotfix"));
    }
}
