//! Longhorn Instance-Manager Rollover
//!
//! Finds workloads whose Longhorn volumes are still served by an old
//! instance-manager and cycles them onto the replacement build.
//!
//! Dry-run by default: the matched workloads and a metrics snapshot are
//! printed and nothing is changed until `--execute` is given.

use clap::Parser;
use regex::Regex;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use longhorn_rollover::exporter;
use longhorn_rollover::{
    Console, Error, ExecutorConfig, KubeClientConfig, KubeResourceClient, Orchestrator,
    PlanFilter, Result, RolloverConfig, RolloverMetrics, RunReport, Strategy, TokioClock,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Restart or bounce Longhorn-attached workloads onto a replacement instance-manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only consider volumes attached on this node
    #[arg(long, env = "ROLLOVER_NODE")]
    node: Option<String>,

    /// Only consider workloads in this namespace
    #[arg(long, env = "ROLLOVER_NAMESPACE")]
    namespace: Option<String>,

    /// Regular expression matched against workload names
    #[arg(long, env = "ROLLOVER_INCLUDE")]
    include: Option<String>,

    /// Maximum number of matched workloads
    #[arg(long, env = "ROLLOVER_LIMIT")]
    limit: Option<usize>,

    /// Rollout timeout per workload in seconds
    #[arg(long, env = "ROLLOVER_TIMEOUT", default_value = "900")]
    timeout: u64,

    /// Dashboard refresh interval in seconds
    #[arg(long, env = "ROLLOVER_INTERVAL", default_value = "15")]
    interval: u64,

    /// Bounded wait of a single rollout-status query in seconds
    #[arg(long, env = "ROLLOVER_POLL_TIMEOUT", default_value = "5")]
    poll_timeout: u64,

    /// How each workload is cycled
    #[arg(long, env = "ROLLOVER_STRATEGY", value_enum, default_value_t = Strategy::Bounce)]
    strategy: Strategy,

    /// Seconds to wait after scale-down before scaling back up
    #[arg(long, env = "ROLLOVER_DOWN_WAIT", default_value = "20")]
    down_wait: u64,

    /// Also cycle workloads already on the replacement instance-manager
    #[arg(long, env = "ROLLOVER_NO_SKIP_MIGRATED")]
    no_skip_migrated: bool,

    /// Apply restarts (default is a dry run)
    #[arg(long, env = "ROLLOVER_EXECUTE")]
    execute: bool,

    /// Keep going after a workload fails
    #[arg(long, env = "ROLLOVER_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Namespace Longhorn is installed in
    #[arg(long, env = "ROLLOVER_LONGHORN_NAMESPACE", default_value = "longhorn-system")]
    longhorn_namespace: String,

    /// Image substring identifying the replacement instance-manager
    #[arg(long, env = "ROLLOVER_MARKER", default_value = "hotfix")]
    marker: String,

    /// Serve Prometheus metrics on this address while running
    #[arg(long, env = "ROLLOVER_METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ROLLOVER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "ROLLOVER_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn rollover_config(&self) -> Result<RolloverConfig> {
        let include = self.include.as_deref().map(Regex::new).transpose()?;

        Ok(RolloverConfig {
            node: self.node.clone(),
            filter: PlanFilter {
                namespace: self.namespace.clone(),
                include,
                limit: self.limit,
            },
            strategy: self.strategy,
            skip_migrated: !self.no_skip_migrated,
            execute: self.execute,
            continue_on_error: self.continue_on_error,
            marker: self.marker.clone(),
            executor: ExecutorConfig {
                timeout: Duration::from_secs(self.timeout),
                interval: Duration::from_secs(self.interval),
                poll_timeout: Duration::from_secs(self.poll_timeout),
                down_wait: Duration::from_secs(self.down_wait),
            },
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    match run(&args).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            info!(failures = report.failures.len(), "Rollover finished with failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Rollover aborted");
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<RunReport> {
    let config = args.rollover_config()?;

    info!("Starting Longhorn instance-manager rollover");
    info!("  Version: {}", longhorn_rollover::VERSION);
    info!("  Strategy: {}", config.strategy);
    info!("  Execute: {}", config.execute);

    let client = KubeResourceClient::connect(KubeClientConfig {
        longhorn_namespace: args.longhorn_namespace.clone(),
        ..Default::default()
    })
    .await?;

    let metrics = match &args.metrics_addr {
        Some(addr) => Some(start_metrics_server(addr)?),
        None => None,
    };

    let console = Console::stdout();
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(client),
        Arc::new(TokioClock::new()),
        console.clone(),
        metrics,
    );

    let report = orchestrator.run().await;
    if console.has_failed() {
        warn!("Rollover report on stdout is incomplete");
    }
    report
}

fn start_metrics_server(addr: &str) -> Result<Arc<RolloverMetrics>> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid metrics address: {}", e)))?;

    let metrics = Arc::new(RolloverMetrics::new()?);
    let server = exporter::bind(addr, metrics.clone())?;
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });
    Ok(metrics)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=warn", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries the plan and dashboards
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
