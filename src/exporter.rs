//! Prometheus exporter
//!
//! Publishes the latest migration snapshot and per-workload outcomes, and
//! optionally serves them over HTTP while a run is in progress.

use crate::error::{Error, Result};
use crate::rollover::dashboard::PartitionTotals;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

const OLD: &str = "old";
const NEW: &str = "new";

/// Rollover metrics, kept in a private registry
pub struct RolloverMetrics {
    registry: Registry,
    engines: IntGaugeVec,
    replicas: IntGaugeVec,
    memory_mib: GaugeVec,
    workloads: IntCounterVec,
}

impl RolloverMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let engines = IntGaugeVec::new(
            Opts::new(
                "longhorn_rollover_engines",
                "Engines served by instance-managers, by generation",
            ),
            &["generation"],
        )?;
        let replicas = IntGaugeVec::new(
            Opts::new(
                "longhorn_rollover_replicas",
                "Replicas served by instance-managers, by generation",
            ),
            &["generation"],
        )?;
        let memory_mib = GaugeVec::new(
            Opts::new(
                "longhorn_rollover_memory_mib",
                "Instance-manager memory usage in MiB, by generation",
            ),
            &["generation"],
        )?;
        let workloads = IntCounterVec::new(
            Opts::new(
                "longhorn_rollover_workloads_total",
                "Workloads processed, by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(engines.clone()))?;
        registry.register(Box::new(replicas.clone()))?;
        registry.register(Box::new(memory_mib.clone()))?;
        registry.register(Box::new(workloads.clone()))?;

        Ok(Self {
            registry,
            engines,
            replicas,
            memory_mib,
            workloads,
        })
    }

    /// Overwrite the gauges with the latest old/new totals
    pub fn observe_partitions(&self, old: &PartitionTotals, new: &PartitionTotals) {
        for (generation, totals) in [(OLD, old), (NEW, new)] {
            self.engines
                .with_label_values(&[generation])
                .set(totals.engines as i64);
            self.replicas
                .with_label_values(&[generation])
                .set(totals.replicas as i64);
            self.memory_mib
                .with_label_values(&[generation])
                .set(totals.memory_mib);
        }
    }

    /// Count one processed workload; `outcome` is completed, failed or skipped
    pub fn record_outcome(&self, outcome: &str) {
        self.workloads.with_label_values(&[outcome]).inc();
    }

    pub fn workloads_total(&self, outcome: &str) -> u64 {
        self.workloads.with_label_values(&[outcome]).get()
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics not UTF-8: {}", e)))
    }
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Bind the listener and return the server future, which serves
/// `/metrics` and `/healthz` until dropped
pub fn bind(
    addr: SocketAddr,
    metrics: Arc<RolloverMetrics>,
) -> Result<impl Future<Output = Result<()>> + Send + 'static> {
    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move { Ok::<_, Infallible>(respond(&metrics, req.uri().path())) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|e| Error::Configuration(format!("Cannot bind metrics address {}: {}", addr, e)))?
        .serve(make_svc);

    info!("Metrics server listening on {}", server.local_addr());
    Ok(async move {
        server
            .await
            .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))
    })
}

fn respond(metrics: &RolloverMetrics, path: &str) -> Response<Body> {
    let (status, body) = match path {
        "/metrics" => match metrics.encode() {
            Ok(text) => (StatusCode::OK, text),
            Err(e) => {
                warn!(error = %e, "Failed to encode metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
        "/healthz" => (StatusCode::OK, "ok".to_string()),
        _ => (StatusCode::NOT_FOUND, "not found".to_string()),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
