//! End-to-end rollover scenarios against the in-memory cluster

use assert_matches::assert_matches;
use longhorn_rollover::rollover::resolver::{discover_workload_volumes, OwnershipCache};
use longhorn_rollover::{
    BackendInstance, Console, Error, FakeCluster, ManualClock, Mutation, Orchestrator, PlanFilter,
    Resolution, RolloutStatus, RolloverConfig, Strategy, VolumeAttachment, Workload,
    WorkloadKind, WorkloadOwner,
};
use std::sync::Arc;
use std::time::Duration;

const OLD_IMAGE: &str = "longhornio/longhorn-instance-manager:old-tag";
const NEW_IMAGE: &str = "longhornio/longhorn-instance-manager:v1.6.1-hotfix-1";

fn attached(volume: &str, node: &str, namespace: &str, owners: Vec<WorkloadOwner>) -> VolumeAttachment {
    VolumeAttachment {
        volume: volume.to_string(),
        state: VolumeAttachment::ATTACHED.to_string(),
        current_node: Some(node.to_string()),
        namespace: Some(namespace.to_string()),
        owners,
    }
}

fn deployment(name: &str) -> Vec<WorkloadOwner> {
    vec![WorkloadOwner::new("Deployment", name)]
}

fn instance(name: &str, node: &str, image: &str) -> BackendInstance {
    BackendInstance {
        name: name.to_string(),
        node: node.to_string(),
        image: image.to_string(),
        engines: 1,
        replicas: 2,
        cpu: None,
        memory: None,
    }
}

fn deploy(namespace: &str, name: &str) -> Workload {
    Workload::new(namespace, WorkloadKind::Deployment, name)
}

fn run_with(cluster: FakeCluster, config: RolloverConfig) -> (Arc<FakeCluster>, Orchestrator, longhorn_rollover::rollover::ConsoleBuffer) {
    let cluster = Arc::new(cluster);
    let (console, buffer) = Console::buffer();
    let orchestrator = Orchestrator::new(config, cluster.clone(), ManualClock::new(), console, None);
    (cluster, orchestrator, buffer)
}

#[tokio::test]
async fn scenario_a_partially_migrated_workload_is_pending() {
    let cluster = FakeCluster::new()
        .with_attachment(attached("v1", "n1", "ns1", deployment("web")))
        .with_attachment(attached("v2", "n1", "ns1", deployment("web")))
        .with_engine("v1", "im-old")
        .with_engine("v2", "im-new")
        .with_instance(instance("im-old", "n1", OLD_IMAGE))
        .with_instance(instance("im-new", "n1", NEW_IMAGE));
    let (_, orchestrator, _) = run_with(cluster, RolloverConfig::default());

    let plans = orchestrator.plan().await.unwrap();

    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].workload, deploy("ns1", "web"));
    assert_eq!(plans[0].volumes, vec!["v1", "v2"]);
    assert!(!plans[0].migrated);
    assert_eq!(plans[0].reason, "v1 (old-tag)");
}

#[tokio::test]
async fn scenario_b_node_filter_excludes_workload() {
    let cluster = FakeCluster::new()
        .with_attachment(attached("v1", "n1", "ns1", deployment("web")))
        .with_attachment(attached("v2", "n1", "ns1", deployment("web")))
        .with_attachment(attached("v3", "n2", "ns1", deployment("api")))
        .with_engine("v1", "im-old")
        .with_instance(instance("im-old", "n1", OLD_IMAGE));
    let config = RolloverConfig {
        node: Some("n2".to_string()),
        ..Default::default()
    };
    let (_, orchestrator, _) = run_with(cluster, config);

    let plans = orchestrator.plan().await.unwrap();

    let workloads: Vec<&Workload> = plans.iter().map(|p| &p.workload).collect();
    assert_eq!(workloads, vec![&deploy("ns1", "api")]);
}

#[tokio::test]
async fn scenario_c_limit_selects_first_in_order() {
    let cluster = FakeCluster::new()
        .with_attachment(attached("v2", "n1", "ns1", deployment("web")))
        .with_attachment(attached("v1", "n1", "ns1", deployment("api")))
        .with_engine("v1", "im-old")
        .with_engine("v2", "im-old")
        .with_instance(instance("im-old", "n1", OLD_IMAGE));
    let config = RolloverConfig {
        filter: PlanFilter {
            limit: Some(1),
            ..Default::default()
        },
        execute: true,
        strategy: Strategy::Restart,
        ..Default::default()
    };
    let (cluster, orchestrator, output) = run_with(cluster, config);

    let report = orchestrator.run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.selected, vec![deploy("ns1", "api")]);
    assert_eq!(cluster.mutations(), vec![Mutation::Restart(deploy("ns1", "api"))]);

    let output = output.contents();
    assert!(output.contains("Matched 1 workload(s):\n   1. [RUN ] ns1 deploy/api\n"));
    assert!(output.contains("\n## [1/1] ns1 deploy/api\n"));
    assert!(output.ends_with("\nAll requested workloads processed successfully.\n"));
}

#[tokio::test]
async fn detached_and_off_node_volumes_are_ignored() {
    let mut detached = attached("v9", "n1", "ns1", deployment("batch"));
    detached.state = "detached".to_string();

    let cluster = FakeCluster::new()
        .with_attachment(detached)
        .with_attachment(attached("v1", "n1", "ns1", deployment("web")))
        .with_attachment(attached("v2", "n2", "ns1", deployment("api")));

    let mut cache = OwnershipCache::new();
    let discovery = discover_workload_volumes(&cluster, Some("n1"), &mut cache)
        .await
        .unwrap();

    assert_eq!(discovery.workloads.len(), 1);
    assert!(discovery.workloads.contains_key(&deploy("ns1", "web")));
    assert_eq!(discovery.stats.attached, 1);
}

#[tokio::test]
async fn replica_set_owners_resolve_once_per_pass() {
    let owners = vec![WorkloadOwner::new("ReplicaSet", "web-7d4b9c8f5c")];
    let cluster = FakeCluster::new()
        .with_attachment(attached("v1", "n1", "ns1", owners.clone()))
        .with_attachment(attached("v2", "n1", "ns1", owners))
        .with_attachment(attached(
            "v3",
            "n1",
            "ns1",
            vec![WorkloadOwner::new("ReplicaSet", "api-5f6d7c8b9a")],
        ))
        .with_replica_set("ns1", "web-7d4b9c8f5c", deployment("web"));

    let mut cache = OwnershipCache::new();
    let discovery = discover_workload_volumes(&cluster, None, &mut cache)
        .await
        .unwrap();

    let web = deploy("ns1", "web");
    let volumes: Vec<&String> = discovery.workloads[&web].iter().collect();
    assert_eq!(volumes, vec!["v1", "v2"]);

    // api's replica set is gone; its deployment name is guessed from the hash suffix
    assert_matches!(
        cache.get(&("ns1".to_string(), "api-5f6d7c8b9a".to_string())),
        Some(Resolution::Guessed(w)) if w == &deploy("ns1", "api")
    );
    assert_matches!(
        cache.get(&("ns1".to_string(), "web-7d4b9c8f5c".to_string())),
        Some(Resolution::Exact(_))
    );
    assert_eq!(cluster.owner_lookups().len(), 2);
    assert_eq!(discovery.stats.guessed, 1);
    assert_eq!(discovery.stats.exact, 2);
}

#[tokio::test]
async fn bounce_timeout_aborts_remaining_workloads() {
    let api = deploy("ns1", "api");
    let clock = ManualClock::new();
    let cluster = Arc::new(
        FakeCluster::new()
            .with_attachment(attached("v1", "n1", "ns1", deployment("api")))
            .with_attachment(attached("v2", "n1", "ns1", deployment("web")))
            .with_engine("v1", "im-old")
            .with_engine("v2", "im-old")
            .with_instance(instance("im-old", "n1", OLD_IMAGE))
            .with_replicas(&api, Some(2))
            .with_rollout(
                &api,
                vec![
                    RolloutStatus::complete("deployment \"api\" successfully rolled out"),
                    RolloutStatus::pending("Waiting for deployment \"api\" rollout to finish: 0 of 2 updated replicas are available..."),
                ],
            ),
    );
    let config = RolloverConfig {
        execute: true,
        executor: longhorn_rollover::ExecutorConfig {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(30),
            down_wait: Duration::from_secs(10),
            ..Default::default()
        },
        ..Default::default()
    };
    let (console, output) = Console::buffer();
    let orchestrator = Orchestrator::new(config, cluster.clone(), clock.clone(), console, None);

    let report = orchestrator.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        cluster.mutations(),
        vec![Mutation::Scale(api.clone(), 0), Mutation::Scale(api.clone(), 2)]
    );
    assert_eq!(cluster.replicas_of(&api), Some(2));

    // settle delay, then one interval per pending poll until past the timeout
    let sleeps = clock.sleeps();
    assert_eq!(sleeps[0], Duration::from_secs(10));
    assert!(sleeps[1..].iter().all(|d| *d == Duration::from_secs(30)));
    assert_eq!(sleeps.len(), 1 + 5);

    let output = output.contents();
    assert!(output.contains("ERROR: Timed out waiting for deploy/api: Waiting for deployment \"api\" rollout to finish: 0 of 2 updated replicas are available..."));
    assert!(!output.contains("## [2/2]"));
    assert!(output.contains("=== Post-Run Metrics ==="));
}

fn pending_cluster() -> FakeCluster {
    FakeCluster::new()
        .with_attachment(attached("v1", "n1", "ns1", deployment("web")))
        .with_engine("v1", "im-old")
        .with_instance(instance("im-old", "n1", OLD_IMAGE))
}

fn executing() -> RolloverConfig {
    RolloverConfig {
        execute: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn failed_backend_query_aborts_before_any_mutation() {
    for operation in ["list_volume_attachments", "list_engine_bindings", "list_backend_instances"] {
        let cluster = pending_cluster().with_failing_query(operation);
        let (cluster, orchestrator, output) = run_with(cluster, executing());

        let err = orchestrator.run().await.unwrap_err();

        assert_matches!(&err, Error::QueryFailed { operation: op, .. } if op == operation);
        assert!(cluster.mutations().is_empty());
        assert_eq!(output.contents(), "");
    }
}

#[tokio::test]
async fn missing_dependency_aborts_before_planning() {
    let cluster = pending_cluster().with_failing_query("check_dependencies");
    let (cluster, orchestrator, output) = run_with(cluster, executing());

    let err = orchestrator.run().await.unwrap_err();

    assert_matches!(err, Error::DependencyUnavailable(_));
    assert!(cluster.mutations().is_empty());
    assert_eq!(output.contents(), "");
}
