//! Cluster topology as published by the discovery service, plus the traits
//! through which the rest of the crate reads it.
//!
//! [`SharedDiscoveryService`] is an in-process implementation: every member
//! of a test or embedded cluster holds a client view onto one shared
//! registry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DiscoveryError, NoLeaderFoundError};
use crate::identity::{ClusterId, DatabaseName, MemberId};

/// Host and port a member advertises to peers or clients.
///
/// IPv6 literals are held without brackets and written as `[host]:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdvertisedSocketAddress {
    host: String,
    port: u16,
}

impl AdvertisedSocketAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves to socket addresses; may hit DNS.
    pub fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl fmt::Display for AdvertisedSocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for AdvertisedSocketAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for AdvertisedSocketAddress {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiscoveryError::InvalidAddress(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(bracketed) => bracketed.strip_suffix(']').ok_or_else(invalid)?,
            // a bare IPv6 literal is ambiguous with the port separator
            None if host.contains(':') => return Err(invalid()),
            None => host,
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// What a core member publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreServerInfo {
    /// Where peers send Raft messages.
    pub raft_server: AdvertisedSocketAddress,
    /// Where client drivers connect.
    pub client_connector: AdvertisedSocketAddress,
    /// Server groups used by load balancing policies.
    pub groups: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReplicaInfo {
    pub client_connector: AdvertisedSocketAddress,
    pub groups: BTreeSet<String>,
}

/// View of the core members as seen from one member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreTopology {
    /// Cluster id published for this database, if any.
    pub cluster_id: Option<ClusterId>,
    /// Whether the observing member is the one allowed to bootstrap.
    pub can_be_bootstrapped: bool,
    pub members: BTreeMap<MemberId, CoreServerInfo>,
}

impl CoreTopology {
    pub fn find(&self, member: &MemberId) -> Option<&CoreServerInfo> {
        self.members.get(member)
    }
}

impl fmt::Display for CoreTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cluster_id = self
            .cluster_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "CoreTopology{{cluster_id: {cluster_id}, can_be_bootstrapped: {}, members: [",
            self.can_be_bootstrapped
        )?;
        for (i, (member, info)) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{member}@{}", info.raft_server)?;
        }
        f.write_str("]}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadReplicaTopology {
    pub members: BTreeMap<MemberId, ReadReplicaInfo>,
}

/// Read and publish access to the core topology.
pub trait CoreTopologyService: Send + Sync {
    fn core_servers(&self) -> Result<CoreTopology, DiscoveryError>;

    fn read_replicas(&self) -> Result<ReadReplicaTopology, DiscoveryError>;

    /// Publishes `cluster_id` for `database`.
    ///
    /// Returns `Ok(false)` if another id was published first; the caller must
    /// then adopt that one.
    fn set_cluster_id(
        &self,
        cluster_id: ClusterId,
        database: &DatabaseName,
    ) -> Result<bool, DiscoveryError>;
}

/// Knows the current Raft leader, if there is one.
pub trait LeaderLocator: Send + Sync {
    fn leader(&self) -> Result<MemberId, NoLeaderFoundError>;
}

#[derive(Default)]
struct Registry {
    cores: BTreeMap<MemberId, CoreServerInfo>,
    read_replicas: BTreeMap<MemberId, ReadReplicaInfo>,
    cluster_ids: HashMap<DatabaseName, ClusterId>,
    leader: Option<MemberId>,
    refuse_to_be_leader: BTreeSet<MemberId>,
}

/// In-process discovery shared by all members of a local cluster.
///
/// The member with the lowest id among those willing to lead is the only one
/// that sees `can_be_bootstrapped`, so exactly one member bootstraps.
#[derive(Clone, Default)]
pub struct SharedDiscoveryService {
    registry: Arc<Mutex<Registry>>,
}

impl SharedDiscoveryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_core(&self, member: MemberId, info: CoreServerInfo) {
        info!(%member, raft = %info.raft_server, "core member joined discovery");
        self.registry.lock().cores.insert(member, info);
    }

    /// Registers a core that must never bootstrap or lead.
    pub fn register_core_refusing_leadership(&self, member: MemberId, info: CoreServerInfo) {
        let mut registry = self.registry.lock();
        registry.refuse_to_be_leader.insert(member);
        registry.cores.insert(member, info);
    }

    pub fn unregister_core(&self, member: &MemberId) {
        let mut registry = self.registry.lock();
        registry.cores.remove(member);
        registry.refuse_to_be_leader.remove(member);
        if registry.leader.as_ref() == Some(member) {
            registry.leader = None;
        }
        info!(%member, "core member left discovery");
    }

    pub fn register_read_replica(&self, member: MemberId, info: ReadReplicaInfo) {
        self.registry.lock().read_replicas.insert(member, info);
    }

    pub fn unregister_read_replica(&self, member: &MemberId) {
        self.registry.lock().read_replicas.remove(member);
    }

    pub fn set_leader(&self, leader: Option<MemberId>) {
        debug!(leader = ?leader, "leader updated");
        self.registry.lock().leader = leader;
    }

    /// Topology view for one member serving `database`.
    pub fn core_client(
        &self,
        member: MemberId,
        database: DatabaseName,
    ) -> SharedDiscoveryCoreClient {
        SharedDiscoveryCoreClient {
            member,
            database,
            registry: self.registry.clone(),
        }
    }
}

impl LeaderLocator for SharedDiscoveryService {
    fn leader(&self) -> Result<MemberId, NoLeaderFoundError> {
        self.registry.lock().leader.ok_or(NoLeaderFoundError)
    }
}

/// One member's handle onto a [`SharedDiscoveryService`].
#[derive(Clone)]
pub struct SharedDiscoveryCoreClient {
    member: MemberId,
    database: DatabaseName,
    registry: Arc<Mutex<Registry>>,
}

impl CoreTopologyService for SharedDiscoveryCoreClient {
    fn core_servers(&self) -> Result<CoreTopology, DiscoveryError> {
        let registry = self.registry.lock();
        let can_be_bootstrapped = registry
            .cores
            .keys()
            .find(|member| !registry.refuse_to_be_leader.contains(*member))
            == Some(&self.member);
        Ok(CoreTopology {
            cluster_id: registry.cluster_ids.get(&self.database).copied(),
            can_be_bootstrapped,
            members: registry.cores.clone(),
        })
    }

    fn read_replicas(&self) -> Result<ReadReplicaTopology, DiscoveryError> {
        Ok(ReadReplicaTopology {
            members: self.registry.lock().read_replicas.clone(),
        })
    }

    fn set_cluster_id(
        &self,
        cluster_id: ClusterId,
        database: &DatabaseName,
    ) -> Result<bool, DiscoveryError> {
        let mut registry = self.registry.lock();
        let published = *registry.cluster_ids.entry(database.clone()).or_insert(cluster_id);
        Ok(published == cluster_id)
    }
}

impl LeaderLocator for SharedDiscoveryCoreClient {
    fn leader(&self) -> Result<MemberId, NoLeaderFoundError> {
        self.registry.lock().leader.ok_or(NoLeaderFoundError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(port: u16) -> CoreServerInfo {
        CoreServerInfo {
            raft_server: AdvertisedSocketAddress::new("localhost", port),
            client_connector: AdvertisedSocketAddress::new("localhost", port + 1000),
            groups: BTreeSet::new(),
        }
    }

    fn db() -> DatabaseName {
        DatabaseName::new("graph.db").unwrap()
    }

    #[test]
    fn address_display_and_parse() -> Result<(), DiscoveryError> {
        let addr: AdvertisedSocketAddress = "core-1.example:7000".parse()?;
        assert_eq!(addr.host(), "core-1.example");
        assert_eq!(addr.port(), 7000);
        assert_eq!(addr.to_string(), "core-1.example:7000");

        assert!("no-port".parse::<AdvertisedSocketAddress>().is_err());
        assert!(":7000".parse::<AdvertisedSocketAddress>().is_err());
        assert!("host:notaport".parse::<AdvertisedSocketAddress>().is_err());
        Ok(())
    }

    #[test]
    fn ipv6_literals_use_brackets() -> Result<(), DiscoveryError> {
        let addr: AdvertisedSocketAddress = "[::1]:7000".parse()?;
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.port(), 7000);
        assert_eq!(addr.to_string(), "[::1]:7000");
        let resolved = addr
            .resolve()
            .map_err(|err| DiscoveryError::InvalidAddress(err.to_string()))?;
        assert_eq!(resolved, vec!["[::1]:7000".parse::<SocketAddr>().expect("socket address")]);

        let socket: SocketAddr = "[::1]:7001".parse().expect("socket address");
        let from_socket = AdvertisedSocketAddress::from(socket);
        assert_eq!(from_socket.to_string(), "[::1]:7001");

        assert!("::1:7000".parse::<AdvertisedSocketAddress>().is_err());
        assert!("[::1:7000".parse::<AdvertisedSocketAddress>().is_err());
        assert!("[]:7000".parse::<AdvertisedSocketAddress>().is_err());
        Ok(())
    }

    #[test]
    fn only_lowest_willing_member_can_bootstrap() -> Result<(), DiscoveryError> {
        let service = SharedDiscoveryService::new();
        let mut ids: Vec<_> = (0..3).map(|_| MemberId::random()).collect();
        ids.sort();

        service.register_core_refusing_leadership(ids[0], info(7000));
        service.register_core(ids[1], info(7001));
        service.register_core(ids[2], info(7002));

        let flags: Vec<bool> = ids
            .iter()
            .map(|id| service.core_client(*id, db()).core_servers().map(|t| t.can_be_bootstrapped))
            .collect::<Result<_, _>>()?;
        assert_eq!(flags, vec![false, true, false]);
        Ok(())
    }

    #[test]
    fn first_published_cluster_id_wins() -> Result<(), DiscoveryError> {
        let service = SharedDiscoveryService::new();
        let a = service.core_client(MemberId::random(), db());
        let b = service.core_client(MemberId::random(), db());

        let first = ClusterId::random();
        let second = ClusterId::random();
        assert!(a.set_cluster_id(first, &db())?);
        assert!(!b.set_cluster_id(second, &db())?);
        assert!(b.set_cluster_id(first, &db())?);
        assert_eq!(b.core_servers()?.cluster_id, Some(first));
        Ok(())
    }

    #[test]
    fn leader_follows_membership() {
        let service = SharedDiscoveryService::new();
        let leader = MemberId::random();
        assert_eq!(service.leader(), Err(NoLeaderFoundError));

        service.register_core(leader, info(7000));
        service.set_leader(Some(leader));
        assert_eq!(service.leader(), Ok(leader));

        service.unregister_core(&leader);
        assert_eq!(service.leader(), Err(NoLeaderFoundError));
    }

    #[test]
    fn topology_display_lists_members() {
        let member = MemberId::random();
        let topology = CoreTopology {
            cluster_id: None,
            can_be_bootstrapped: true,
            members: BTreeMap::from([(member, info(7000))]),
        };
        let rendered = topology.to_string();
        assert!(rendered.contains("cluster_id: none"));
        assert!(rendered.contains("localhost:7000"));
    }
}
