//! Plan Builder
//!
//! Classifies each discovered workload as migrated or pending by checking
//! which instance-manager serves every attached volume.

use crate::domain::model::{image_tag, Workload};
use crate::domain::ports::ResourceClient;
use crate::error::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reason recorded for workloads that need no restart
pub const MIGRATED_REASON: &str = "all attached volumes on replacement instance-manager";

/// Per-workload rollover decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadPlan {
    pub workload: Workload,
    /// Attached volume names, sorted
    pub volumes: Vec<String>,
    pub migrated: bool,
    pub reason: String,
}

/// Lookup tables for volume → instance-manager → image
#[derive(Debug, Clone, Default)]
pub struct BackendIndex {
    volume_instance: HashMap<String, String>,
    instance_image: HashMap<String, String>,
}

impl BackendIndex {
    pub fn new(
        bindings: impl IntoIterator<Item = (String, String)>,
        images: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            volume_instance: bindings.into_iter().collect(),
            instance_image: images.into_iter().collect(),
        }
    }

    /// Query engine bindings and instance-manager images
    pub async fn load(client: &dyn ResourceClient) -> Result<Self> {
        let bindings = client.list_engine_bindings().await?;
        let instances = client.list_backend_instances().await?;

        Ok(Self::new(
            bindings.into_iter().map(|b| (b.volume, b.instance)),
            instances.into_iter().map(|i| (i.name, i.image)),
        ))
    }

    /// Pending entry for `volume`, or `None` when it is served by the
    /// replacement version
    fn pending_entry(&self, volume: &str, marker: &str) -> Option<String> {
        let instance = self
            .volume_instance
            .get(volume)
            .map(String::as_str)
            .unwrap_or_default();
        let image = self
            .instance_image
            .get(instance)
            .map(String::as_str)
            .unwrap_or_default();

        if image.contains(marker) && !image.is_empty() {
            None
        } else if !image.is_empty() {
            Some(format!("{} ({})", volume, image_tag(image)))
        } else if !instance.is_empty() {
            Some(format!("{} (unknown image via {})", volume, instance))
        } else {
            Some(format!("{} (no instance-manager)", volume))
        }
    }
}

/// Classify every workload, in workload order
pub fn build_plans(
    workloads: &BTreeMap<Workload, BTreeSet<String>>,
    index: &BackendIndex,
    marker: &str,
) -> Vec<WorkloadPlan> {
    workloads
        .iter()
        .map(|(workload, volumes)| {
            let volumes: Vec<String> = volumes.iter().cloned().collect();
            let pending: Vec<String> = volumes
                .iter()
                .filter_map(|v| index.pending_entry(v, marker))
                .collect();

            let migrated = pending.is_empty() && !volumes.is_empty();
            let reason = if migrated {
                MIGRATED_REASON.to_string()
            } else {
                pending.join("; ")
            };

            WorkloadPlan {
                workload: workload.clone(),
                volumes,
                migrated,
                reason,
            }
        })
        .collect()
}

/// Filter criteria applied to the full plan set
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub namespace: Option<String>,
    pub include: Option<regex::Regex>,
    pub limit: Option<usize>,
}

impl PlanFilter {
    /// Keep plans matching namespace and name pattern, then truncate to the
    /// limit in plan order
    pub fn apply(&self, plans: Vec<WorkloadPlan>) -> Vec<WorkloadPlan> {
        let matched = plans.into_iter().filter(|p| {
            self.namespace
                .as_deref()
                .map_or(true, |ns| p.workload.namespace == ns)
                && self
                    .include
                    .as_ref()
                    .map_or(true, |re| re.is_match(&p.workload.name))
        });

        match self.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        }
    }
}
