//! Rollout status viewers for pod controllers.
//!
//! Each viewer inspects a freshly fetched object and reports whether its
//! rollout has finished, using the same checks and wording as
//! `kubectl rollout status`.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};

use crate::domain::model::RolloutStatus;

/// A controller whose rollout progress can be read from its own status
pub trait RolloutView {
    fn rollout_status(&self) -> RolloutStatus;
}

impl RolloutView for Deployment {
    fn rollout_status(&self) -> RolloutStatus {
        let name = self.metadata.name.as_deref().unwrap_or_default();
        let status = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or(0);

        if generation > status.observed_generation.unwrap_or(0) {
            return RolloutStatus::pending("Waiting for deployment spec update to be observed...");
        }

        let deadline_exceeded = status.conditions.iter().flatten().any(|c| {
            c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
        });
        if deadline_exceeded {
            return RolloutStatus::pending(format!(
                "deployment \"{name}\" exceeded its progress deadline"
            ));
        }

        let updated = status.updated_replicas.unwrap_or(0);
        let replicas = status.replicas.unwrap_or(0);
        let available = status.available_replicas.unwrap_or(0);

        if let Some(desired) = self.spec.as_ref().and_then(|s| s.replicas) {
            if updated < desired {
                return RolloutStatus::pending(format!(
                    "Waiting for deployment \"{name}\" rollout to finish: {updated} out of {desired} new replicas have been updated..."
                ));
            }
        }
        if replicas > updated {
            return RolloutStatus::pending(format!(
                "Waiting for deployment \"{name}\" rollout to finish: {} old replicas are pending termination...",
                replicas - updated
            ));
        }
        if available < updated {
            return RolloutStatus::pending(format!(
                "Waiting for deployment \"{name}\" rollout to finish: {available} of {updated} updated replicas are available..."
            ));
        }

        RolloutStatus::complete(format!("deployment \"{name}\" successfully rolled out"))
    }
}

impl RolloutView for StatefulSet {
    fn rollout_status(&self) -> RolloutStatus {
        let spec = self.spec.clone().unwrap_or_default();
        let status = self.status.clone().unwrap_or_default();

        let strategy = spec.update_strategy.clone().unwrap_or_default();
        if strategy.type_.as_deref().is_some_and(|t| t != "RollingUpdate") {
            return RolloutStatus::pending(
                "rollout status is only available for RollingUpdate strategy type",
            );
        }

        let observed = status.observed_generation.unwrap_or(0);
        if observed == 0 || self.metadata.generation.unwrap_or(0) > observed {
            return RolloutStatus::pending("Waiting for statefulset spec update to be observed...");
        }

        let ready = status.ready_replicas.unwrap_or(0);
        if let Some(desired) = spec.replicas {
            if ready < desired {
                return RolloutStatus::pending(format!(
                    "Waiting for {} pods to be ready...",
                    desired - ready
                ));
            }
        }

        let partition = strategy
            .rolling_update
            .and_then(|ru| ru.partition)
            .unwrap_or(0);
        if partition > 0 {
            let updated = status.updated_replicas.unwrap_or(0);
            let target = spec.replicas.unwrap_or(1) - partition;
            if updated < target {
                return RolloutStatus::pending(format!(
                    "Waiting for partitioned roll out to finish: {updated} out of {target} new pods have been updated..."
                ));
            }
            return RolloutStatus::complete(format!(
                "partitioned roll out complete: {updated} new pods have been updated..."
            ));
        }

        let update_revision = status.update_revision.unwrap_or_default();
        let current_revision = status.current_revision.unwrap_or_default();
        if update_revision != current_revision {
            return RolloutStatus::pending(format!(
                "waiting for statefulset rolling update to complete {} pods at revision {update_revision}...",
                status.updated_replicas.unwrap_or(0)
            ));
        }

        RolloutStatus::complete(format!(
            "statefulset rolling update complete {} pods at revision {current_revision}...",
            status.current_replicas.unwrap_or(0)
        ))
    }
}

impl RolloutView for DaemonSet {
    fn rollout_status(&self) -> RolloutStatus {
        let name = self.metadata.name.as_deref().unwrap_or_default();
        let status = self.status.clone().unwrap_or_default();

        let strategy = self
            .spec
            .as_ref()
            .and_then(|s| s.update_strategy.as_ref())
            .and_then(|s| s.type_.as_deref());
        if strategy.is_some_and(|t| t != "RollingUpdate") {
            return RolloutStatus::pending(
                "rollout status is only available for RollingUpdate strategy type",
            );
        }

        if self.metadata.generation.unwrap_or(0) > status.observed_generation.unwrap_or(0) {
            return RolloutStatus::pending("Waiting for daemon set spec update to be observed...");
        }

        let desired = status.desired_number_scheduled;
        let updated = status.updated_number_scheduled.unwrap_or(0);
        let available = status.number_available.unwrap_or(0);

        if updated < desired {
            return RolloutStatus::pending(format!(
                "Waiting for daemon set \"{name}\" rollout to finish: {updated} out of {desired} new pods have been updated..."
            ));
        }
        if available < desired {
            return RolloutStatus::pending(format!(
                "Waiting for daemon set \"{name}\" rollout to finish: {available} of {desired} updated pods are available..."
            ));
        }

        RolloutStatus::complete(format!("daemon set \"{name}\" successfully rolled out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus, StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(generation: i64, desired: i32, status: DeploymentStatus) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".into()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(status),
        }
    }

    #[test]
    fn test_deployment_not_observed() {
        let d = deployment(3, 2, DeploymentStatus {
            observed_generation: Some(2),
            ..Default::default()
        });
        let status = d.rollout_status();
        assert!(!status.done);
        assert!(status.message.contains("spec update to be observed"));
    }

    #[test]
    fn test_deployment_waiting_for_availability() {
        let d = deployment(2, 2, DeploymentStatus {
            observed_generation: Some(2),
            replicas: Some(2),
            updated_replicas: Some(2),
            available_replicas: Some(1),
            ..Default::default()
        });
        let status = d.rollout_status();
        assert!(!status.done);
        assert_eq!(
            status.message,
            "Waiting for deployment \"web\" rollout to finish: 1 of 2 updated replicas are available..."
        );
    }

    #[test]
    fn test_deployment_scaled_to_zero() {
        let d = deployment(4, 0, DeploymentStatus {
            observed_generation: Some(4),
            ..Default::default()
        });
        let status = d.rollout_status();
        assert!(status.done);
        assert_eq!(status.message, "deployment \"web\" successfully rolled out");

        let terminating = deployment(4, 0, DeploymentStatus {
            observed_generation: Some(4),
            replicas: Some(1),
            ..Default::default()
        });
        assert!(!terminating.rollout_status().done);
    }

    #[test]
    fn test_statefulset_revisions() {
        let mut sts = StatefulSet {
            metadata: ObjectMeta {
                name: Some("db".into()),
                generation: Some(5),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                observed_generation: Some(5),
                replicas: 3,
                ready_replicas: Some(3),
                updated_replicas: Some(1),
                current_replicas: Some(2),
                current_revision: Some("db-6d5f".into()),
                update_revision: Some("db-7a9c".into()),
                ..Default::default()
            }),
        };
        let status = sts.rollout_status();
        assert!(!status.done);
        assert!(status.message.contains("revision db-7a9c"));

        if let Some(s) = sts.status.as_mut() {
            s.current_revision = Some("db-7a9c".into());
            s.current_replicas = Some(3);
        }
        let status = sts.rollout_status();
        assert!(status.done);
        assert_eq!(
            status.message,
            "statefulset rolling update complete 3 pods at revision db-7a9c..."
        );
    }
}
