//! Longhorn Engine CRD
//!
//! Each volume has an engine; its status names the instance-manager that
//! currently hosts the engine process.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::model::EngineBinding;

/// A Longhorn volume engine
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "Engine",
    plural = "engines",
    shortname = "lhe",
    status = "EngineStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpec {
    #[serde(default)]
    pub volume_name: String,

    #[serde(default, rename = "nodeID")]
    pub node_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    #[serde(default)]
    pub instance_manager_name: String,

    #[serde(default)]
    pub current_state: String,
}

impl Engine {
    pub fn to_binding(&self) -> EngineBinding {
        EngineBinding {
            volume: self.spec.volume_name.clone(),
            instance: self
                .status
                .as_ref()
                .map(|s| s.instance_manager_name.clone())
                .unwrap_or_default(),
        }
    }
}
