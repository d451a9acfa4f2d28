use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::debug;

use super::{Endpoint, LoadBalancingPlugin, LoadBalancingResult};
use crate::config::ClusterConfig;
use crate::discovery::{
    AdvertisedSocketAddress, CoreTopology, CoreTopologyService, LeaderLocator, ReadReplicaTopology,
};
use crate::error::ProcedureError;
use crate::identity::MemberId;

/// Everything a routing table is computed from.
pub(crate) struct RoutingInput {
    pub cores: CoreTopology,
    pub read_replicas: ReadReplicaTopology,
    pub leader: Option<MemberId>,
}

/// Routing table computation shared by every plugin.
///
/// - route: every core
/// - write: the leader, if known
/// - read: read replicas, plus cores when there are no read replicas or
///   follower reads are allowed; the leader only when it is the sole core
///
/// When `groups` is given, route and read lists keep only servers tagged with
/// one of those groups, unless that would leave the list empty.
pub(crate) fn compute(
    input: &RoutingInput,
    allow_reads_on_followers: bool,
    ttl: Duration,
    groups: Option<&BTreeSet<String>>,
) -> LoadBalancingResult {
    let accepts = |tags: &BTreeSet<String>| groups.map_or(true, |wanted| !wanted.is_disjoint(tags));

    let core_candidates: Vec<(&AdvertisedSocketAddress, &BTreeSet<String>)> = input
        .cores
        .members
        .values()
        .map(|info| (&info.client_connector, &info.groups))
        .collect();

    let route = restrict(core_candidates.clone(), accepts);

    let write = input
        .leader
        .and_then(|leader| input.cores.find(&leader))
        .map(|info| vec![Endpoint::write(info.client_connector.clone())])
        .unwrap_or_default();

    let mut read_candidates: Vec<_> = input
        .read_replicas
        .members
        .values()
        .map(|info| (&info.client_connector, &info.groups))
        .collect();
    if read_candidates.is_empty() || allow_reads_on_followers {
        let exclude_leader = input.cores.members.len() > 1;
        read_candidates.extend(
            input
                .cores
                .members
                .iter()
                .filter(|(member, _)| !(exclude_leader && input.leader.as_ref() == Some(*member)))
                .map(|(_, info)| (&info.client_connector, &info.groups)),
        );
    }
    let read = restrict(read_candidates, accepts);

    let mut rng = rand::thread_rng();
    let mut route: Vec<_> = route.into_iter().map(Endpoint::route).collect();
    let mut read: Vec<_> = read.into_iter().map(Endpoint::read).collect();
    route.shuffle(&mut rng);
    read.shuffle(&mut rng);

    debug!(
        route = route.len(),
        write = write.len(),
        read = read.len(),
        "computed routing table"
    );
    LoadBalancingResult::new(route, write, read, ttl)
}

/// Keeps accepted candidates, falling back to all of them if none is accepted.
fn restrict(
    candidates: Vec<(&AdvertisedSocketAddress, &BTreeSet<String>)>,
    accepts: impl Fn(&BTreeSet<String>) -> bool,
) -> Vec<AdvertisedSocketAddress> {
    let accepted: Vec<_> = candidates
        .iter()
        .filter(|(_, groups)| accepts(groups))
        .map(|(address, _)| (*address).clone())
        .collect();
    if accepted.is_empty() {
        candidates.into_iter().map(|(address, _)| address.clone()).collect()
    } else {
        accepted
    }
}

/// Single data center routing; ignores the client context.
pub struct DefaultLoadBalancingPlugin {
    topology_service: Arc<dyn CoreTopologyService>,
    leader_locator: Arc<dyn LeaderLocator>,
    ttl: Duration,
    allow_reads_on_followers: bool,
}

impl DefaultLoadBalancingPlugin {
    pub fn new(
        topology_service: Arc<dyn CoreTopologyService>,
        leader_locator: Arc<dyn LeaderLocator>,
        ttl: Duration,
        allow_reads_on_followers: bool,
    ) -> Self {
        Self {
            topology_service,
            leader_locator,
            ttl,
            allow_reads_on_followers,
        }
    }

    pub fn from_config(
        config: &ClusterConfig,
        topology_service: Arc<dyn CoreTopologyService>,
        leader_locator: Arc<dyn LeaderLocator>,
    ) -> Self {
        Self::new(
            topology_service,
            leader_locator,
            config.cluster_routing_ttl(),
            config.cluster_allow_reads_on_followers,
        )
    }

    pub(crate) fn input(&self) -> Result<RoutingInput, ProcedureError> {
        Ok(RoutingInput {
            cores: self.topology_service.core_servers()?,
            read_replicas: self.topology_service.read_replicas()?,
            // No leader during an election is expected; writes are simply unavailable.
            leader: self.leader_locator.leader().ok(),
        })
    }

    pub(crate) fn compute_for(
        &self,
        groups: Option<&BTreeSet<String>>,
    ) -> Result<LoadBalancingResult, ProcedureError> {
        let input = self.input()?;
        Ok(compute(&input, self.allow_reads_on_followers, self.ttl, groups))
    }
}

impl LoadBalancingPlugin for DefaultLoadBalancingPlugin {
    fn name(&self) -> &'static str {
        "default"
    }

    fn run(
        &self,
        _context: &HashMap<String, String>,
    ) -> Result<LoadBalancingResult, ProcedureError> {
        self.compute_for(None)
    }
}
