//! Binding a core member to a cluster identity.
//!
//! On a fresh store the member waits for enough peers to show up in
//! discovery. Exactly one of them (the one discovery marks as able to
//! bootstrap) creates the [`ClusterId`] and an initial snapshot; everyone else
//! adopts the published id. Once bound, the id is kept in durable storage and
//! later restarts skip discovery altogether.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::discovery::{CoreTopology, CoreTopologyService};
use crate::error::{BindError, ConfigError};
use crate::identity::{ClusterId, DatabaseName, MemberId};
use crate::state::SimpleStorage;
use crate::throttle::LogThrottle;

/// Interval between "still waiting" log lines while binding.
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Initial state of a freshly bootstrapped cluster, produced by the storage
/// engine. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSnapshot {
    pub prev_index: i64,
    pub prev_term: i64,
    pub payload: Vec<u8>,
}

/// Creates the initial snapshot over the founding members.
pub trait CoreBootstrapper: Send + Sync {
    fn bootstrap(&self, members: &BTreeSet<MemberId>) -> anyhow::Result<CoreSnapshot>;
}

/// Outcome of binding. A snapshot is present only if this member bootstrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundState {
    cluster_id: ClusterId,
    snapshot: Option<CoreSnapshot>,
}

impl BoundState {
    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    pub fn snapshot(&self) -> Option<&CoreSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn into_snapshot(self) -> Option<CoreSnapshot> {
        self.snapshot
    }
}

pub struct ClusterBinder {
    cluster_id_storage: Arc<dyn SimpleStorage<ClusterId>>,
    database_name_storage: Arc<dyn SimpleStorage<DatabaseName>>,
    topology_service: Arc<dyn CoreTopologyService>,
    bootstrapper: Arc<dyn CoreBootstrapper>,
    database_name: DatabaseName,
    minimum_core_hosts: usize,
    timeout: Duration,
    retry_interval: Duration,
    wait_log: LogThrottle,
}

impl ClusterBinder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster_id_storage: Arc<dyn SimpleStorage<ClusterId>>,
        database_name_storage: Arc<dyn SimpleStorage<DatabaseName>>,
        topology_service: Arc<dyn CoreTopologyService>,
        bootstrapper: Arc<dyn CoreBootstrapper>,
        database_name: DatabaseName,
        minimum_core_hosts: usize,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            cluster_id_storage,
            database_name_storage,
            topology_service,
            bootstrapper,
            database_name,
            minimum_core_hosts,
            timeout,
            retry_interval,
            wait_log: LogThrottle::new(WAIT_LOG_INTERVAL),
        }
    }

    pub fn from_config(
        config: &ClusterConfig,
        cluster_id_storage: Arc<dyn SimpleStorage<ClusterId>>,
        database_name_storage: Arc<dyn SimpleStorage<DatabaseName>>,
        topology_service: Arc<dyn CoreTopologyService>,
        bootstrapper: Arc<dyn CoreBootstrapper>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            cluster_id_storage,
            database_name_storage,
            topology_service,
            bootstrapper,
            config.database_name()?,
            config.minimum_core_cluster_size_at_formation,
            config.cluster_binding_timeout(),
            config.cluster_binding_retry_interval(),
        ))
    }

    /// Obtains the cluster id, bootstrapping the cluster if this member is
    /// the one allowed to. Blocks the calling thread until bound or timed out.
    ///
    /// # Errors
    ///
    /// - [`BindError::DatabaseNameMismatch`] if the store belongs to another database
    /// - [`BindError::Timeout`] if no cluster id was obtained in time
    /// - [`BindError::Storage`] if durable state could not be read or written
    /// - [`BindError::Bootstrap`] if creating the initial snapshot failed
    pub fn bind_to_cluster(&self) -> Result<BoundState, BindError> {
        self.verify_database_name()?;

        if self.cluster_id_storage.exists() {
            let cluster_id = self.cluster_id_storage.read_state()?;
            self.republish(cluster_id);
            info!(%cluster_id, "bound to previously persisted cluster");
            return Ok(BoundState {
                cluster_id,
                snapshot: None,
            });
        }

        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut last_topology: Option<CoreTopology> = None;

        loop {
            match self.topology_service.core_servers() {
                Ok(topology) => {
                    if let Some(cluster_id) = topology.cluster_id {
                        info!(%cluster_id, "bound to cluster published in discovery");
                        return self.persisted(cluster_id, None);
                    }

                    if self.is_bootstrappable(&topology) {
                        if let Some(bound) = self.bootstrap(&topology)? {
                            return Ok(bound);
                        }
                    } else {
                        self.log_waiting(&topology);
                    }
                    last_topology = Some(topology);
                }
                Err(err) => warn!(error = %err, "failed to read core topology, retrying"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BindError::Timeout {
                    elapsed: start.elapsed(),
                    topology: last_topology
                        .map(|topology| topology.to_string())
                        .unwrap_or_else(|| "no topology observed".to_string()),
                });
            }
            thread::sleep(self.retry_interval.min(deadline - now));
        }
    }

    fn verify_database_name(&self) -> Result<(), BindError> {
        if self.database_name_storage.exists() {
            let stored = self.database_name_storage.read_state()?;
            if stored != self.database_name {
                return Err(BindError::DatabaseNameMismatch {
                    stored,
                    configured: self.database_name.clone(),
                });
            }
        } else {
            self.database_name_storage.write_state(&self.database_name)?;
        }
        Ok(())
    }

    fn is_bootstrappable(&self, topology: &CoreTopology) -> bool {
        topology.can_be_bootstrapped && topology.members.len() >= self.minimum_core_hosts
    }

    /// Returns `None` when publishing lost to another member; the caller then
    /// picks up the winner's id on its next topology read.
    fn bootstrap(&self, topology: &CoreTopology) -> Result<Option<BoundState>, BindError> {
        let cluster_id = ClusterId::random();
        let members: BTreeSet<MemberId> = topology.members.keys().copied().collect();
        info!(%cluster_id, members = members.len(), "bootstrapping cluster");

        let snapshot = self
            .bootstrapper
            .bootstrap(&members)
            .map_err(BindError::Bootstrap)?;

        match self.topology_service.set_cluster_id(cluster_id, &self.database_name) {
            Ok(true) => self.persisted(cluster_id, Some(snapshot)).map(Some),
            Ok(false) => {
                info!(
                    %cluster_id,
                    "another member published a cluster id first, discarding snapshot"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(%cluster_id, error = %err, "failed to publish cluster id, retrying");
                Ok(None)
            }
        }
    }

    fn republish(&self, cluster_id: ClusterId) {
        match self.topology_service.set_cluster_id(cluster_id, &self.database_name) {
            Ok(true) => {}
            Ok(false) => warn!(
                %cluster_id,
                "discovery holds a different cluster id than the one persisted"
            ),
            Err(err) => warn!(%cluster_id, error = %err, "failed to republish cluster id"),
        }
    }

    fn persisted(
        &self,
        cluster_id: ClusterId,
        snapshot: Option<CoreSnapshot>,
    ) -> Result<BoundState, BindError> {
        self.cluster_id_storage.write_state(&cluster_id)?;
        Ok(BoundState { cluster_id, snapshot })
    }

    fn log_waiting(&self, topology: &CoreTopology) {
        let discovered = topology.members.len();
        self.wait_log.invoke(|| {
            if discovered < self.minimum_core_hosts {
                info!(
                    discovered,
                    required = self.minimum_core_hosts,
                    "waiting for more core members before forming a cluster"
                );
            } else {
                info!(discovered, "waiting for another member to bootstrap the cluster");
            }
        });
    }
}
