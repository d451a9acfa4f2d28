use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{DefaultLoadBalancingPlugin, Endpoint, LoadBalancingPlugin, LoadBalancingResult, Role};
use crate::error::ProcedureError;

/// Single data center procedure, kept for older drivers.
pub const GET_SERVERS_PROCEDURE: &str = "dbms.cluster.routing.getServers";

/// Procedure taking a routing context, answered by the configured plugin.
pub const GET_ROUTING_TABLE_PROCEDURE: &str = "dbms.cluster.routing.getRoutingTable";

/// One role and the addresses serving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub role: Role,
    pub addresses: Vec<String>,
}

/// Record returned to drivers. `ttl` is in seconds and roles without any
/// address are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResponse {
    pub ttl: u64,
    pub servers: Vec<ServerEntry>,
}

impl RoutingResponse {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn addresses(&self, role: Role) -> &[String] {
        self.servers
            .iter()
            .find(|entry| entry.role == role)
            .map(|entry| entry.addresses.as_slice())
            .unwrap_or(&[])
    }
}

impl From<&LoadBalancingResult> for RoutingResponse {
    fn from(result: &LoadBalancingResult) -> Self {
        let entries = [
            (Role::Write, result.write_endpoints()),
            (Role::Read, result.read_endpoints()),
            (Role::Route, result.route_endpoints()),
        ];
        let servers = entries
            .into_iter()
            .filter(|(_, endpoints)| !endpoints.is_empty())
            .map(|(role, endpoints)| ServerEntry {
                role,
                addresses: endpoints
                    .iter()
                    .map(|Endpoint { address, .. }| address.to_string())
                    .collect(),
            })
            .collect();
        Self {
            ttl: result.ttl().as_secs(),
            servers,
        }
    }
}

/// A routing procedure callable by drivers.
pub trait RoutingProcedure: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, context: &HashMap<String, String>) -> Result<RoutingResponse, ProcedureError>;
}

pub struct GetServersV1 {
    plugin: Arc<DefaultLoadBalancingPlugin>,
}

impl GetServersV1 {
    pub fn new(plugin: Arc<DefaultLoadBalancingPlugin>) -> Self {
        Self { plugin }
    }
}

impl RoutingProcedure for GetServersV1 {
    fn name(&self) -> &'static str {
        GET_SERVERS_PROCEDURE
    }

    fn apply(&self, _context: &HashMap<String, String>) -> Result<RoutingResponse, ProcedureError> {
        let result = self.plugin.run(&HashMap::new())?;
        Ok(RoutingResponse::from(&result))
    }
}

pub struct GetServersV2 {
    plugin: Arc<dyn LoadBalancingPlugin>,
}

impl GetServersV2 {
    pub fn new(plugin: Arc<dyn LoadBalancingPlugin>) -> Self {
        Self { plugin }
    }
}

impl RoutingProcedure for GetServersV2 {
    fn name(&self) -> &'static str {
        GET_ROUTING_TABLE_PROCEDURE
    }

    fn apply(&self, context: &HashMap<String, String>) -> Result<RoutingResponse, ProcedureError> {
        let result = self.plugin.run(context)?;
        Ok(RoutingResponse::from(&result))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::discovery::AdvertisedSocketAddress;

    #[test]
    fn empty_roles_are_omitted_and_ttl_is_seconds() -> anyhow::Result<()> {
        let result = LoadBalancingResult::new(
            vec![Endpoint::route(AdvertisedSocketAddress::new("a", 7687))],
            Vec::new(),
            vec![Endpoint::read(AdvertisedSocketAddress::new("b", 7687))],
            Duration::from_millis(300_000),
        );
        let response = RoutingResponse::from(&result);
        assert_eq!(response.ttl, 300);
        assert_eq!(response.servers.len(), 2);
        assert!(response.addresses(Role::Write).is_empty());

        let json: serde_json::Value = serde_json::from_str(&response.to_json()?)?;
        assert_eq!(json["ttl"], 300);
        assert_eq!(json["servers"][0]["role"], "READ");
        assert_eq!(json["servers"][0]["addresses"][0], "b:7687");
        assert_eq!(json["servers"][1]["role"], "ROUTE");
        Ok(())
    }
}
