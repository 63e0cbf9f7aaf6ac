//! Longhorn Custom Resource Definitions
//!
//! Read-only models of the Longhorn resources the rollover engine queries:
//! - Volume: attachment state and consuming workloads
//! - Engine: which instance-manager serves a volume
//! - InstanceManager: per-node engine/replica process group and its image

pub mod engine;
pub mod instance_manager;
pub mod volume;

pub use engine::*;
pub use instance_manager::*;
pub use volume::*;
