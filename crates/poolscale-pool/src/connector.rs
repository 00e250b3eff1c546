//! Scheduler-side view of a pool.

use poolscale_core::{AgentMetadata, ClusterResources};

/// Access to the scheduler (Mesos, Kubernetes) running on a pool's
/// machines.
///
/// Values are served from state captured by the last
/// [`reload_state`](ClusterConnector::reload_state).
pub trait ClusterConnector: Send {
    /// Refresh cached scheduler state. Called at the start of every cycle.
    fn reload_state(&mut self) -> anyhow::Result<()>;

    /// Total amount of `resource` the pool's agents offer.
    fn get_resource_total(&self, resource: &str) -> f64;

    /// Amount of `resource` currently allocated to tasks.
    fn get_resource_allocation(&self, resource: &str) -> f64;

    /// Metadata for the agent at `ip_address`.
    fn agent_metadata_for_ip(&self, ip_address: &str) -> AgentMetadata;

    /// Metadata for the agent at `ip_address`; instances without an IP
    /// yield an `Unknown` agent.
    fn get_agent_metadata(&self, ip_address: Option<&str>) -> AgentMetadata {
        match ip_address {
            Some(ip) if !ip.is_empty() => self.agent_metadata_for_ip(ip),
            _ => AgentMetadata::default(),
        }
    }

    fn get_percent_resource_allocation(&self, resource: &str) -> f64 {
        let total = self.get_resource_total(resource);
        if total == 0.0 {
            0.0
        } else {
            self.get_resource_allocation(resource) / total
        }
    }

    fn get_cluster_total_resources(&self) -> ClusterResources {
        ClusterResources::from_fn(|r| self.get_resource_total(r))
    }

    fn get_cluster_allocated_resources(&self) -> ClusterResources {
        ClusterResources::from_fn(|r| self.get_resource_allocation(r))
    }
}
