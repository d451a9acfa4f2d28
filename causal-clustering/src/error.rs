//! Error types for the clustering core.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::identity::DatabaseName;

/// Failures of [`crate::binder::ClusterBinder::bind_to_cluster`].
#[derive(Debug, Error)]
pub enum BindError {
    /// The store was created for another database. Operator error, never retried.
    #[error(
        "database name mismatch: store was bound to '{stored}' but '{configured}' is configured"
    )]
    DatabaseNameMismatch {
        stored: DatabaseName,
        configured: DatabaseName,
    },

    #[error("failed to bind to a cluster within {elapsed:?}; last observed topology: {topology}")]
    Timeout { elapsed: Duration, topology: String },

    #[error("binding state storage failed: {0}")]
    Storage(#[from] io::Error),

    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] anyhow::Error),
}

/// Failures talking to the discovery service.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery service unavailable: {0}")]
    Unavailable(String),

    #[error("discovery service rejected publish: {0}")]
    PublishFailed(String),

    #[error("invalid advertised address '{0}'")]
    InvalidAddress(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no leader found")]
pub struct NoLeaderFoundError;

/// Failures of routing procedures.
#[derive(Debug, Error)]
pub enum ProcedureError {
    #[error("unable to read topology: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("unknown load balancing policy '{0}'")]
    UnknownPolicy(String),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("database name is {0} bytes, the maximum is 127")]
    DatabaseNameTooLong(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
