//! Settings for a core cluster member.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::DatabaseName;

/// Cluster settings. Every field has a default, so a config file only needs
/// the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Name of the database this member serves.
    pub database_name: String,

    // -- Binding --
    /// Core members that must be discovered before a cluster may be formed.
    pub minimum_core_cluster_size_at_formation: usize,
    /// Give up binding after this long.
    pub cluster_binding_timeout_ms: u64,
    /// Pause between binding attempts.
    pub cluster_binding_retry_interval_ms: u64,

    // -- In-flight cache --
    pub in_flight_cache_max_entries: usize,
    pub in_flight_cache_max_bytes: u64,
    pub in_flight_cache_enabled: bool,

    // -- Membership --
    /// Records written to one membership state file before switching to the other.
    pub raft_membership_state_size: usize,

    // -- Outbound messaging --
    /// Messages buffered per peer before new ones are dropped.
    pub outgoing_queue_size: usize,
    /// Wait between failed connection attempts to a peer.
    pub connect_backoff_ms: u64,
    /// Minimum gap between "unknown address" log lines.
    pub unknown_address_logging_throttle_ms: u64,

    // -- Routing --
    /// How long clients may cache a routing table.
    pub cluster_routing_ttl_secs: u64,
    /// Serve reads from followers as well as read replicas.
    pub cluster_allow_reads_on_followers: bool,
    /// Named policies, each restricting routing to servers in the given groups.
    pub load_balancing_policies: BTreeMap<String, BTreeSet<String>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            database_name: "graph.db".to_string(),
            minimum_core_cluster_size_at_formation: 3,
            cluster_binding_timeout_ms: 300_000,
            cluster_binding_retry_interval_ms: 1_000,
            in_flight_cache_max_entries: 1_024,
            in_flight_cache_max_bytes: 2 * 1024 * 1024 * 1024,
            in_flight_cache_enabled: true,
            raft_membership_state_size: 1_000,
            outgoing_queue_size: 64,
            connect_backoff_ms: 100,
            unknown_address_logging_throttle_ms: 10_000,
            cluster_routing_ttl_secs: 300,
            cluster_allow_reads_on_followers: true,
            load_balancing_policies: BTreeMap::new(),
        }
    }
}

impl ClusterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Rejects settings that would make a component unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database_name()?;

        let non_zero = [
            (
                "minimum_core_cluster_size_at_formation",
                self.minimum_core_cluster_size_at_formation as u64,
            ),
            ("in_flight_cache_max_entries", self.in_flight_cache_max_entries as u64),
            ("raft_membership_state_size", self.raft_membership_state_size as u64),
            ("outgoing_queue_size", self.outgoing_queue_size as u64),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }

        if let Some((name, _)) = self
            .load_balancing_policies
            .iter()
            .find(|(_, groups)| groups.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "load balancing policy '{name}' names no server groups"
            )));
        }
        Ok(())
    }

    pub fn database_name(&self) -> Result<DatabaseName, ConfigError> {
        DatabaseName::new(self.database_name.clone())
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn cluster_binding_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster_binding_timeout_ms)
    }

    pub fn cluster_binding_retry_interval(&self) -> Duration {
        Duration::from_millis(self.cluster_binding_retry_interval_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn unknown_address_logging_throttle(&self) -> Duration {
        Duration::from_millis(self.unknown_address_logging_throttle_ms)
    }

    pub fn cluster_routing_ttl(&self) -> Duration {
        Duration::from_secs(self.cluster_routing_ttl_secs)
    }
}
