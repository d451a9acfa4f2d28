//! Routing tables for client drivers.
//!
//! A routing table says where a driver may send writes, where it may send
//! reads and which servers it may ask for a fresh table. It is computed on
//! every request from discovery and leader state and never stored.

mod default_plugin;
mod procedure;
mod server_policies;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use default_plugin::DefaultLoadBalancingPlugin;
pub use procedure::{
    GetServersV1, GetServersV2, RoutingProcedure, RoutingResponse, ServerEntry,
    GET_ROUTING_TABLE_PROCEDURE, GET_SERVERS_PROCEDURE,
};
pub use server_policies::{ServerPoliciesPlugin, POLICY_CONTEXT_KEY};

use crate::discovery::AdvertisedSocketAddress;
use crate::error::ProcedureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Write,
    Read,
    Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: AdvertisedSocketAddress,
    pub role: Role,
}

impl Endpoint {
    pub fn write(address: AdvertisedSocketAddress) -> Self {
        Self {
            address,
            role: Role::Write,
        }
    }

    pub fn read(address: AdvertisedSocketAddress) -> Self {
        Self {
            address,
            role: Role::Read,
        }
    }

    pub fn route(address: AdvertisedSocketAddress) -> Self {
        Self {
            address,
            role: Role::Route,
        }
    }
}

/// Computed routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancingResult {
    route: Vec<Endpoint>,
    write: Vec<Endpoint>,
    read: Vec<Endpoint>,
    ttl: Duration,
}

impl LoadBalancingResult {
    pub fn new(
        route: Vec<Endpoint>,
        write: Vec<Endpoint>,
        read: Vec<Endpoint>,
        ttl: Duration,
    ) -> Self {
        Self {
            route,
            write,
            read,
            ttl,
        }
    }

    pub fn route_endpoints(&self) -> &[Endpoint] {
        &self.route
    }

    pub fn write_endpoints(&self) -> &[Endpoint] {
        &self.write
    }

    pub fn read_endpoints(&self) -> &[Endpoint] {
        &self.read
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ttl_millis(&self) -> u64 {
        self.ttl.as_millis() as u64
    }
}

/// Computes a routing table from a client-supplied context.
pub trait LoadBalancingPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, context: &HashMap<String, String>)
        -> Result<LoadBalancingResult, ProcedureError>;
}
