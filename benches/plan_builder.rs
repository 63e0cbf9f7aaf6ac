//! Benchmark for discovery, plan classification and dashboard assembly
//!
//! Sized for a large cluster: 2K attached volumes across 500 workloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use longhorn_rollover::rollover::dashboard::MetricsSnapshot;
use longhorn_rollover::rollover::plan::{build_plans, BackendIndex, PlanFilter};
use longhorn_rollover::rollover::resolver::{OwnershipCache, WorkloadResolver};
use longhorn_rollover::{
    BackendInstance, DashboardConfig, FakeCluster, PodUsage, VolumeAttachment, Workload,
    WorkloadKind, WorkloadOwner,
};
use std::collections::{BTreeMap, BTreeSet};

const WORKLOADS: usize = 500;
const VOLUMES_PER_WORKLOAD: usize = 4;
const NODES: usize = 20;

fn instance_name(node: usize, hotfix: bool) -> String {
    format!("instance-manager-{:02}-{}", node, if hotfix { "new" } else { "old" })
}

fn instances() -> Vec<BackendInstance> {
    (0..NODES)
        .flat_map(|node| {
            [false, true].into_iter().map(move |hotfix| BackendInstance {
                name: instance_name(node, hotfix),
                node: format!("node-{:02}", node),
                image: if hotfix {
                    "longhornio/longhorn-instance-manager:v1.6.1-hotfix-1".to_string()
                } else {
                    "longhornio/longhorn-instance-manager:v1.6.1".to_string()
                },
                engines: 50,
                replicas: 60,
                cpu: None,
                memory: None,
            })
        })
        .collect()
}

fn workload_volumes() -> BTreeMap<Workload, BTreeSet<String>> {
    (0..WORKLOADS)
        .map(|w| {
            let workload = Workload::new(
                format!("ns-{}", w % 10),
                WorkloadKind::Deployment,
                format!("app-{:04}", w),
            );
            let volumes = (0..VOLUMES_PER_WORKLOAD)
                .map(|v| format!("pvc-{:04}-{}", w, v))
                .collect();
            (workload, volumes)
        })
        .collect()
}

fn backend_index() -> BackendIndex {
    let bindings = (0..WORKLOADS).flat_map(|w| {
        (0..VOLUMES_PER_WORKLOAD).map(move |v| {
            (
                format!("pvc-{:04}-{}", w, v),
                instance_name(w % NODES, (w + v) % 3 == 0),
            )
        })
    });
    let images = instances().into_iter().map(|i| (i.name, i.image));
    BackendIndex::new(bindings, images)
}

fn bench_build_plans(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_builder");
    group.throughput(Throughput::Elements(WORKLOADS as u64));

    let workloads = workload_volumes();
    let index = backend_index();

    group.bench_function("build_plans", |b| {
        b.iter(|| build_plans(black_box(&workloads), black_box(&index), "hotfix"));
    });

    let plans = build_plans(&workloads, &index, "hotfix");
    let filter = PlanFilter {
        namespace: Some("ns-3".to_string()),
        include: regex::Regex::new("^app-0[0-4]").ok(),
        limit: Some(25),
    };
    group.bench_function("filter_plans", |b| {
        b.iter(|| filter.apply(black_box(plans.clone())));
    });

    group.finish();
}

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_builder");
    group.throughput(Throughput::Elements((WORKLOADS * VOLUMES_PER_WORKLOAD) as u64));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let mut cluster = FakeCluster::new();
    let mut attachments = Vec::new();
    for w in 0..WORKLOADS {
        let namespace = format!("ns-{}", w % 10);
        let replica_set = format!("app-{:04}-7d4b9c8f5{}", w, w % 10);
        cluster = cluster.with_replica_set(
            &namespace,
            &replica_set,
            vec![WorkloadOwner::new("Deployment", format!("app-{:04}", w))],
        );
        for v in 0..VOLUMES_PER_WORKLOAD {
            attachments.push(VolumeAttachment {
                volume: format!("pvc-{:04}-{}", w, v),
                state: VolumeAttachment::ATTACHED.to_string(),
                current_node: Some(format!("node-{:02}", w % NODES)),
                namespace: Some(namespace.clone()),
                owners: vec![WorkloadOwner::new("ReplicaSet", replica_set.clone())],
            });
        }
    }

    group.bench_function("discover_with_cache", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut cache = OwnershipCache::new();
                WorkloadResolver::new(&cluster, &mut cache)
                    .discover(black_box(&attachments), None)
                    .await
            })
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_builder");

    let inventory = instances();
    let usage: Vec<PodUsage> = inventory
        .iter()
        .map(|i| PodUsage {
            name: i.name.clone(),
            cpu: "120m".to_string(),
            memory: "812Mi".to_string(),
        })
        .collect();
    let config = DashboardConfig::default();

    group.bench_function("assemble_snapshot", |b| {
        b.iter(|| {
            MetricsSnapshot::assemble(black_box(inventory.clone()), &usage, None, &config)
                .to_string()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_build_plans, bench_discovery, bench_snapshot);
criterion_main!(benches);
