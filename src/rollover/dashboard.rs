//! Metrics Aggregator
//!
//! Point-in-time view of instance-manager inventory split into old and
//! replacement builds, with engine/replica counts, memory usage and node
//! memory pressure. Rendered repeatedly while workloads are cycled.

use crate::domain::model::{BackendInstance, NodeUsage, PodUsage};
use crate::domain::ports::ResourceClientRef;
use crate::error::Result;
use crate::exporter::RolloverMetrics;
use crate::rollover::console::Console;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the metrics aggregator
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Restrict the view to one node
    pub target_node: Option<String>,
    /// Image substring identifying the replacement build
    pub marker: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            target_node: None,
            marker: "hotfix".to_string(),
        }
    }
}

// =============================================================================
// Snapshot Types
// =============================================================================

/// Totals for one side of the migration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartitionTotals {
    pub engines: usize,
    pub replicas: usize,
    pub memory_mib: f64,
}

impl PartitionTotals {
    fn add(&mut self, instance: &BackendInstance) {
        self.engines += instance.engines;
        self.replicas += instance.replicas;
        self.memory_mib += instance.memory.as_deref().map_or(0.0, parse_memory_mib);
    }
}

/// Node memory figure shown under the summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeMemory {
    /// Usage of the targeted node
    Target { memory: String, percent: u32 },
    /// Node with the highest memory percentage
    Busiest { node: String, memory: String, percent: u32 },
    Unavailable,
}

impl fmt::Display for NodeMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMemory::Target { memory, percent } => write!(f, "{} ({}%)", memory, percent),
            NodeMemory::Busiest {
                node,
                memory,
                percent,
            } => write!(f, "{} {} ({}%)", node, memory, percent),
            NodeMemory::Unavailable => write!(f, "n/a"),
        }
    }
}

/// One rendering of the dashboard
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Instances sorted by node then name
    pub instances: Vec<BackendInstance>,
    pub old: PartitionTotals,
    pub new: PartitionTotals,
    pub node_memory: NodeMemory,
}

impl MetricsSnapshot {
    /// Build a snapshot from raw inventory and usage samples
    pub fn assemble(
        mut instances: Vec<BackendInstance>,
        pod_usage: &[PodUsage],
        node_usage: Option<&[NodeUsage]>,
        config: &DashboardConfig,
    ) -> Self {
        let usage: HashMap<&str, &PodUsage> =
            pod_usage.iter().map(|u| (u.name.as_str(), u)).collect();

        if let Some(node) = &config.target_node {
            instances.retain(|i| &i.node == node);
        }
        for instance in &mut instances {
            if let Some(sample) = usage.get(instance.name.as_str()) {
                instance.cpu = Some(sample.cpu.clone());
                instance.memory = Some(sample.memory.clone());
            }
        }
        instances.sort_by(|a, b| (&a.node, &a.name).cmp(&(&b.node, &b.name)));

        let mut old = PartitionTotals::default();
        let mut new = PartitionTotals::default();
        for instance in &instances {
            if instance.is_replacement(&config.marker) {
                new.add(instance);
            } else {
                old.add(instance);
            }
        }

        let node_memory = node_usage
            .map(|nodes| node_memory(nodes, config.target_node.as_deref()))
            .unwrap_or(NodeMemory::Unavailable);

        Self {
            instances,
            old,
            new,
            node_memory,
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Migration Summary: old engines/replicas={}/{}, new engines/replicas={}/{}, old mem={:.0}Mi, new mem={:.0}Mi",
            self.old.engines,
            self.old.replicas,
            self.new.engines,
            self.new.replicas,
            self.old.memory_mib,
            self.new.memory_mib
        )?;
        writeln!(f, "Node memory: {}", self.node_memory)?;
        writeln!(f, "Instance Managers:")?;
        write!(
            f,
            "  {:<12} {:<44} {:<8} {:<8} IMAGE",
            "NODE", "NAME", "E/R", "MEM"
        )?;
        for instance in &self.instances {
            let er = format!("{}/{}", instance.engines, instance.replicas);
            write!(
                f,
                "\n  {:<12} {:<44} {:<8} {:<8} {}",
                instance.node,
                instance.name,
                er,
                instance.memory.as_deref().unwrap_or("-"),
                instance.version_tag()
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Metrics Aggregator
// =============================================================================

/// Polls inventory and usage and renders the dashboard
pub struct MetricsAggregator {
    config: DashboardConfig,
    client: ResourceClientRef,
    console: Console,
    metrics: Option<Arc<RolloverMetrics>>,
}

impl MetricsAggregator {
    pub fn new(client: ResourceClientRef, config: DashboardConfig, console: Console) -> Self {
        Self {
            config,
            client,
            console,
            metrics: None,
        }
    }

    /// Also publish every snapshot to the Prometheus registry
    pub fn with_metrics(mut self, metrics: Arc<RolloverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Collect a snapshot; usage sampling failures degrade to unknown values
    pub async fn snapshot(&self) -> Result<MetricsSnapshot> {
        let instances = self.client.list_backend_instances().await?;

        let pod_usage = match self.client.pod_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                debug!(error = %e, "Pod usage unavailable");
                Vec::new()
            }
        };
        let node_usage = match self.client.node_usage().await {
            Ok(usage) => Some(usage),
            Err(e) => {
                debug!(error = %e, "Node usage unavailable");
                None
            }
        };

        let snapshot =
            MetricsSnapshot::assemble(instances, &pod_usage, node_usage.as_deref(), &self.config);

        if let Some(metrics) = &self.metrics {
            metrics.observe_partitions(&snapshot.old, &snapshot.new);
        }
        Ok(snapshot)
    }

    /// Collect a snapshot and print it under `header`
    pub async fn render(&self, header: &str) -> Result<MetricsSnapshot> {
        let snapshot = self.snapshot().await?;
        if !header.is_empty() {
            self.console.line(format!("\n=== {} ===", header));
        }
        self.console.line(snapshot.to_string());
        Ok(snapshot)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Convert a `kubectl top` style memory value to MiB; unknown units are 0
pub fn parse_memory_mib(value: &str) -> f64 {
    let value = value.trim();
    let units: [(&str, f64); 4] = [
        ("Ki", 1.0 / 1024.0),
        ("Mi", 1.0),
        ("Gi", 1024.0),
        ("Ti", 1024.0 * 1024.0),
    ];

    for (suffix, factor) in units {
        if let Some(number) = value.strip_suffix(suffix) {
            return number.trim().parse::<f64>().map_or(0.0, |n| n * factor);
        }
    }
    0.0
}

fn node_memory(nodes: &[NodeUsage], target: Option<&str>) -> NodeMemory {
    match target {
        Some(target) => nodes
            .iter()
            .find(|n| n.name == target)
            .map_or(NodeMemory::Unavailable, |n| NodeMemory::Target {
                memory: n.memory.clone(),
                percent: n.memory_percent,
            }),
        None => nodes
            .iter()
            .fold(None::<&NodeUsage>, |best, n| match best {
                Some(b) if b.memory_percent >= n.memory_percent => Some(b),
                _ => Some(n),
            })
            .map_or(NodeMemory::Unavailable, |n| NodeMemory::Busiest {
                node: n.name.clone(),
                memory: n.memory.clone(),
                percent: n.memory_percent,
            }),
    }
}
