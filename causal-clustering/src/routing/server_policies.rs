use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::{DefaultLoadBalancingPlugin, LoadBalancingPlugin, LoadBalancingResult};
use crate::config::ClusterConfig;
use crate::error::ProcedureError;

/// Context key naming the policy a client wants applied.
pub const POLICY_CONTEXT_KEY: &str = "policy";

/// Multi data center routing driven by named server-group policies.
///
/// A policy restricts route and read endpoints to servers in its groups. A
/// request without a `policy` key gets the unrestricted table.
pub struct ServerPoliciesPlugin {
    base: DefaultLoadBalancingPlugin,
    policies: BTreeMap<String, BTreeSet<String>>,
}

impl ServerPoliciesPlugin {
    pub fn new(
        base: DefaultLoadBalancingPlugin,
        policies: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        Self { base, policies }
    }

    pub fn from_config(config: &ClusterConfig, base: DefaultLoadBalancingPlugin) -> Self {
        Self::new(base, config.load_balancing_policies.clone())
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}

impl LoadBalancingPlugin for ServerPoliciesPlugin {
    fn name(&self) -> &'static str {
        "server_policies"
    }

    fn run(
        &self,
        context: &HashMap<String, String>,
    ) -> Result<LoadBalancingResult, ProcedureError> {
        let groups = match context.get(POLICY_CONTEXT_KEY) {
            Some(name) => {
                let groups = self
                    .policies
                    .get(name)
                    .ok_or_else(|| ProcedureError::UnknownPolicy(name.clone()))?;
                debug!(policy = %name, "applying load balancing policy");
                Some(groups)
            }
            None => None,
        };
        self.base.compute_for(groups)
    }
}
