use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::Outbound;
use crate::config::ClusterConfig;
use crate::discovery::{AdvertisedSocketAddress, CoreTopologyService};
use crate::identity::{MemberId, StoreId};
use crate::messages::{RaftMessage, StoreIdAwareMessage};
use crate::throttle::LogThrottle;

/// Current identity of the local store.
pub trait StoreIdSource: Send + Sync {
    fn store_id(&self) -> StoreId;
}

impl<F> StoreIdSource for F
where
    F: Fn() -> StoreId + Send + Sync,
{
    fn store_id(&self) -> StoreId {
        self()
    }
}

/// Sends Raft messages addressed by member id.
///
/// Resolves the member's Raft address through discovery and tags every
/// message with the local store id. Messages for members discovery does not
/// know are dropped, with at most one warning per throttle interval.
pub struct RaftOutbound {
    topology_service: Arc<dyn CoreTopologyService>,
    outbound: Arc<dyn Outbound<AdvertisedSocketAddress, StoreIdAwareMessage>>,
    store_id: Arc<dyn StoreIdSource>,
    unknown_address_log: LogThrottle,
}

impl RaftOutbound {
    pub fn new(
        topology_service: Arc<dyn CoreTopologyService>,
        outbound: Arc<dyn Outbound<AdvertisedSocketAddress, StoreIdAwareMessage>>,
        store_id: Arc<dyn StoreIdSource>,
        unknown_address_throttle: Duration,
    ) -> Self {
        Self {
            topology_service,
            outbound,
            store_id,
            unknown_address_log: LogThrottle::new(unknown_address_throttle),
        }
    }

    pub fn from_config(
        config: &ClusterConfig,
        topology_service: Arc<dyn CoreTopologyService>,
        outbound: Arc<dyn Outbound<AdvertisedSocketAddress, StoreIdAwareMessage>>,
        store_id: Arc<dyn StoreIdSource>,
    ) -> Self {
        Self::new(
            topology_service,
            outbound,
            store_id,
            config.unknown_address_logging_throttle(),
        )
    }

    pub fn unknown_address_throttle(&self) -> Duration {
        self.unknown_address_log.interval()
    }

    fn resolve(&self, to: &MemberId) -> Option<AdvertisedSocketAddress> {
        let address = match self.topology_service.core_servers() {
            Ok(topology) => topology.find(to).map(|info| info.raft_server.clone()),
            Err(err) => {
                self.unknown_address_log.invoke(|| {
                    warn!(
                        member = %to,
                        error = %err,
                        "cannot read topology to resolve member, dropping messages"
                    );
                });
                return None;
            }
        };
        if address.is_none() {
            self.unknown_address_log.invoke(|| {
                warn!(member = %to, "no raft address known for member, dropping messages");
            });
        }
        address
    }
}

impl Outbound<MemberId, RaftMessage> for RaftOutbound {
    fn send(&self, to: &MemberId, message: RaftMessage) {
        if let Some(address) = self.resolve(to) {
            let store_id = self.store_id.store_id();
            self.outbound.send(&address, StoreIdAwareMessage::new(store_id, message));
        }
    }

    fn send_all(&self, to: &MemberId, messages: Vec<RaftMessage>) {
        let Some(address) = self.resolve(to) else {
            return;
        };
        let store_id = self.store_id.store_id();
        let wrapped = messages
            .into_iter()
            .map(|message| StoreIdAwareMessage::new(store_id, message))
            .collect();
        self.outbound.send_all(&address, wrapped);
    }
}
