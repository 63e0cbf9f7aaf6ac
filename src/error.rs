//! Error types for the Longhorn rollover tool
//!
//! Provides structured error types for discovery, planning, rollover
//! execution and the control-plane client.

use thiserror::Error;

/// Unified error type for the rollover tool
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required dependency: {0}")]
    DependencyUnavailable(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Query failed ({operation}): {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("{operation} failed for {workload}: {reason}")]
    MutationFailed {
        workload: String,
        operation: String,
        reason: String,
    },

    // =========================================================================
    // Rollover Errors
    // =========================================================================
    #[error("Timed out waiting for {workload}: {detail}")]
    RolloutTimeout { workload: String, detail: String },

    #[error("Rollout of {workload} did not settle: {detail}")]
    RolloutFailed { workload: String, detail: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Invalid workload name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Quantity parse error: {0}")]
    QuantityParse(String),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// How far a failure reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Only the workload being cycled failed; the loop may move on
    Workload,
    /// The whole run cannot continue
    Run,
}

impl Error {
    /// Determine how far this error reaches
    pub fn scope(&self) -> FailureScope {
        match self {
            Error::RolloutTimeout { .. }
            | Error::RolloutFailed { .. }
            | Error::MutationFailed { .. } => FailureScope::Workload,

            // Startup and discovery problems abort the run
            Error::DependencyUnavailable(_)
            | Error::Configuration(_)
            | Error::InvalidPattern(_) => FailureScope::Run,

            _ => FailureScope::Run,
        }
    }

    /// Check if this error is scoped to a single workload
    pub fn is_workload_scoped(&self) -> bool {
        matches!(self.scope(), FailureScope::Workload)
    }

    /// Check if repeating the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::QueryFailed { .. })
    }

    pub(crate) fn query(operation: impl Into<String>, reason: impl ToString) -> Self {
        Error::QueryFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the rollover tool
pub type Result<T> = std::result::Result<T, Error>;
