//! Domain Model - Value types shared by discovery, planning and rollover
//!
//! Everything here is rebuilt from control-plane queries on each run and
//! dropped at process exit.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Workloads
// =============================================================================

/// Kind of a higher-level workload that owns volume-consuming pods
///
/// Variants are declared in the order of their kubectl resource names so the
/// derived ordering matches a sort on [`WorkloadKind::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    DaemonSet,
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// kubectl resource name used in workload references
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::DaemonSet => "daemonset",
            WorkloadKind::Deployment => "deploy",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }

    /// Map a Kubernetes owner kind onto a workload kind
    pub fn from_owner_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(WorkloadKind::Deployment),
            "StatefulSet" => Some(WorkloadKind::StatefulSet),
            "DaemonSet" => Some(WorkloadKind::DaemonSet),
            _ => None,
        }
    }

    /// Whether the workload can be scaled to zero replicas
    pub fn is_scalable(&self) -> bool {
        !matches!(self, WorkloadKind::DaemonSet)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a workload; ordered by namespace, kind, then name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Workload {
    pub namespace: String,
    pub kind: WorkloadKind,
    pub name: String,
}

impl Workload {
    pub fn new(namespace: impl Into<String>, kind: WorkloadKind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            name: name.into(),
        }
    }

    /// Display reference, e.g. `deploy/web`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.namespace, self.kind, self.name)
    }
}

// =============================================================================
// Volume Attachments
// =============================================================================

/// A consumer of a volume as reported by the storage system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadOwner {
    /// Declared owner kind (`Deployment`, `ReplicaSet`, `StatefulSet`, ...)
    pub kind: String,
    pub name: String,
}

impl WorkloadOwner {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Runtime attachment record of a storage volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub volume: String,
    /// Attachment state, e.g. `attached` or `detached`
    pub state: String,
    pub current_node: Option<String>,
    /// Namespace of the consuming PVC
    pub namespace: Option<String>,
    pub owners: Vec<WorkloadOwner>,
}

impl VolumeAttachment {
    pub const ATTACHED: &'static str = "attached";

    pub fn is_attached(&self) -> bool {
        self.state == Self::ATTACHED
    }

    /// Attached, and on `node` when a node filter is given
    pub fn is_attached_on(&self, node: Option<&str>) -> bool {
        if !self.is_attached() {
            return false;
        }
        match node {
            Some(node) => self.current_node.as_deref() == Some(node),
            None => true,
        }
    }
}

/// Which backend instance currently serves a volume's engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineBinding {
    pub volume: String,
    pub instance: String,
}

// =============================================================================
// Backend Instances
// =============================================================================

/// A running storage-backend process group on one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInstance {
    pub name: String,
    pub node: String,
    pub image: String,
    pub engines: usize,
    pub replicas: usize,
    /// Sampled CPU, `None` when usage metrics are unavailable
    pub cpu: Option<String>,
    /// Sampled memory, `None` when usage metrics are unavailable
    pub memory: Option<String>,
}

impl BackendInstance {
    /// Tag portion of the image reference (everything after the last `:`)
    pub fn version_tag(&self) -> &str {
        image_tag(&self.image)
    }

    /// Whether the instance runs the replacement version
    pub fn is_replacement(&self, marker: &str) -> bool {
        self.image.contains(marker)
    }
}

/// Tag portion of an image reference, or the whole reference when untagged
pub fn image_tag(image: &str) -> &str {
    image.rsplit(':').next().unwrap_or(image)
}

// =============================================================================
// Resource Usage
// =============================================================================

/// Usage sample for a single pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// Usage sample for a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub memory_percent: u32,
}

// =============================================================================
// Rollout Status
// =============================================================================

/// Result of a single rollout-status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStatus {
    pub done: bool,
    /// Latest status text, e.g. `Waiting for deployment "web" rollout to finish...`
    pub message: String,
}

impl RolloutStatus {
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            done: true,
            message: message.into(),
        }
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            done: false,
            message: message.into(),
        }
    }
}
