//! Cluster Adapters
//!
//! Provides implementations of the [`ResourceClient`](crate::domain::ResourceClient) port:
//! - Kubernetes: live control plane via kube-rs
//! - Fake: in-memory cluster for tests, benches and offline runs

pub mod fake;
pub mod kube_client;
pub mod quantity;
pub mod rollout;

pub use fake::{FakeCluster, Mutation};
pub use kube_client::{KubeClientConfig, KubeResourceClient};
pub use rollout::RolloutView;
