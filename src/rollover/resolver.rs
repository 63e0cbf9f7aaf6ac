//! Workload Resolver
//!
//! Maps Longhorn volume attachments to the workloads that own the consuming
//! pods. Replica-set owners are resolved to their Deployment through the
//! control plane, with a name-based guess when that lookup gives nothing.

use crate::domain::model::{VolumeAttachment, Workload, WorkloadKind, WorkloadOwner};
use crate::domain::ports::ResourceClient;
use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Owner kind Longhorn reports for pods managed by a Deployment
pub const REPLICA_SET_KIND: &str = "ReplicaSet";

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of resolving one declared owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Owner is a workload, or the control plane named its Deployment
    Exact(Workload),
    /// Deployment name derived by stripping the replica-set hash suffix
    Guessed(Workload),
    /// Owner kind is not a workload we can cycle
    Unresolved,
}

impl Resolution {
    pub fn workload(&self) -> Option<&Workload> {
        match self {
            Resolution::Exact(w) | Resolution::Guessed(w) => Some(w),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_guessed(&self) -> bool {
        matches!(self, Resolution::Guessed(_))
    }
}

/// Replica-set resolutions keyed by (namespace, replica-set name)
///
/// Owned by the caller and scoped to one discovery pass.
pub type OwnershipCache = HashMap<(String, String), Resolution>;

// =============================================================================
// Discovery Result
// =============================================================================

/// Counters collected during a discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Attachments that passed the state/node filter
    pub attached: usize,
    pub exact: usize,
    pub guessed: usize,
    pub unresolved: usize,
    /// Control-plane lookups of replica-set owners
    pub owner_lookups: usize,
}

/// Workloads and the volumes they use
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub workloads: BTreeMap<Workload, BTreeSet<String>>,
    pub stats: DiscoveryStats,
}

// =============================================================================
// Workload Resolver
// =============================================================================

/// Resolves declared volume consumers to workloads
pub struct WorkloadResolver<'a> {
    client: &'a dyn ResourceClient,
    cache: &'a mut OwnershipCache,
    stats: DiscoveryStats,
}

impl<'a> WorkloadResolver<'a> {
    pub fn new(client: &'a dyn ResourceClient, cache: &'a mut OwnershipCache) -> Self {
        Self {
            client,
            cache,
            stats: DiscoveryStats::default(),
        }
    }

    /// Resolve a single declared owner within `namespace`
    pub async fn resolve(&mut self, namespace: &str, owner: &WorkloadOwner) -> Resolution {
        if let Some(kind) = WorkloadKind::from_owner_kind(&owner.kind) {
            return Resolution::Exact(Workload::new(namespace, kind, &owner.name));
        }
        if owner.kind == REPLICA_SET_KIND {
            return self.resolve_replica_set(namespace, &owner.name).await;
        }
        Resolution::Unresolved
    }

    async fn resolve_replica_set(&mut self, namespace: &str, name: &str) -> Resolution {
        let key = (namespace.to_string(), name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        self.stats.owner_lookups += 1;
        let owner = match self.client.owner_references(namespace, name).await {
            Ok(owners) => owners
                .into_iter()
                .find(|o| o.kind == "Deployment" && !o.name.is_empty()),
            Err(e) => {
                debug!(namespace, replica_set = name, error = %e, "Replica set lookup failed");
                None
            }
        };

        let resolution = match owner {
            Some(owner) => {
                debug!(namespace, replica_set = name, deployment = %owner.name, "Resolved replica set owner");
                Resolution::Exact(Workload::new(namespace, WorkloadKind::Deployment, owner.name))
            }
            None => {
                let guessed = guess_deployment_name(name);
                warn!(
                    namespace,
                    replica_set = name,
                    deployment = %guessed,
                    "Replica set owner unknown, guessing deployment from name"
                );
                Resolution::Guessed(Workload::new(namespace, WorkloadKind::Deployment, guessed))
            }
        };

        self.cache.insert(key, resolution.clone());
        resolution
    }

    /// Group attached volumes by owning workload
    ///
    /// Only attachments in the `attached` state (and on `node`, when given)
    /// contribute. Unresolvable owners are dropped without error.
    pub async fn discover(mut self, attachments: &[VolumeAttachment], node: Option<&str>) -> Discovery {
        let mut workloads: BTreeMap<Workload, BTreeSet<String>> = BTreeMap::new();

        for attachment in attachments.iter().filter(|a| a.is_attached_on(node)) {
            self.stats.attached += 1;

            let Some(namespace) = attachment.namespace.as_deref() else {
                self.stats.unresolved += attachment.owners.len();
                continue;
            };

            for owner in &attachment.owners {
                let resolution = self.resolve(namespace, owner).await;
                match &resolution {
                    Resolution::Exact(_) => self.stats.exact += 1,
                    Resolution::Guessed(_) => self.stats.guessed += 1,
                    Resolution::Unresolved => {
                        self.stats.unresolved += 1;
                        continue;
                    }
                }

                if let Some(workload) = resolution.workload() {
                    let volumes = workloads.entry(workload.clone()).or_default();
                    if !attachment.volume.is_empty() {
                        volumes.insert(attachment.volume.clone());
                    }
                }
            }
        }

        Discovery {
            workloads,
            stats: self.stats,
        }
    }
}

/// List volume attachments and resolve them to workloads
pub async fn discover_workload_volumes(
    client: &dyn ResourceClient,
    node: Option<&str>,
    cache: &mut OwnershipCache,
) -> Result<Discovery> {
    let attachments = client.list_volume_attachments().await?;
    let discovery = WorkloadResolver::new(client, cache)
        .discover(&attachments, node)
        .await;

    debug!(
        volumes = attachments.len(),
        workloads = discovery.workloads.len(),
        stats = ?discovery.stats,
        "Discovered Longhorn-attached workloads"
    );
    Ok(discovery)
}

/// Strip a trailing `-<9 or 10 lowercase hex chars>` replica-set hash
///
/// Names without such a suffix are returned unchanged. Generated hashes that
/// use non-hex characters do not match and are not stripped.
pub fn guess_deployment_name(replica_set: &str) -> String {
    match replica_set.rsplit_once('-') {
        Some((base, hash)) if is_hash_suffix(hash) => base.to_string(),
        _ => replica_set.to_string(),
    }
}

fn is_hash_suffix(hash: &str) -> bool {
    (9..=10).contains(&hash.len())
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
