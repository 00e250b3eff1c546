//! Node selection for scale-down.
//!
//! Candidates are ordered cheapest-to-remove first and then walked
//! greedily, skipping any node whose removal would break a limit, until
//! fulfilled capacity is at or below the new target.

use std::collections::BTreeMap;

use poolscale_core::{AgentState, ClusterNodeMetadata, TaskKillLimit};
use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};
use crate::manager::{PoolManager, RUNNING_STATES};

/// Nodes chosen for removal, keyed by resource group id.
pub type NodesByGroup = BTreeMap<String, Vec<ClusterNodeMetadata>>;

/// A node can be removed if the scheduler knows it, considers it safe, and
/// it is not running more tasks than we could ever kill in one pass.
pub fn is_killable(node: &ClusterNodeMetadata, max_tasks_to_kill: TaskKillLimit) -> bool {
    if node.agent.state == AgentState::Unknown || !node.agent.is_safe_to_kill {
        return false;
    }
    max_tasks_to_kill.is_greater_than(node.agent.task_count) || node.agent.task_count == 0
}

/// Sort key; lower sorts first. Orphaned, then idle, then stale, then by
/// batch task count, then by total task count.
pub fn kill_priority(node: &ClusterNodeMetadata) -> (bool, bool, bool, u64, u64) {
    (
        node.agent.state != AgentState::Orphaned,
        node.agent.state != AgentState::Idle,
        !node.instance.is_stale,
        node.agent.batch_task_count,
        node.agent.task_count,
    )
}

/// Killable nodes from `nodes`, in kill order. The sort is stable.
pub fn prioritize_killable_nodes(
    nodes: Vec<ClusterNodeMetadata>,
    max_tasks_to_kill: TaskKillLimit,
) -> Vec<ClusterNodeMetadata> {
    let mut killable: Vec<ClusterNodeMetadata> = nodes
        .into_iter()
        .filter(|n| is_killable(n, max_tasks_to_kill))
        .collect();
    killable.sort_by_key(kill_priority);
    killable
}

/// Everything [`select_nodes_to_prune`] needs besides the candidates.
#[derive(Debug, Clone)]
pub struct PruneBudget {
    pub new_target_capacity: f64,
    pub fulfilled_capacity: f64,
    pub non_orphan_fulfilled_capacity: f64,
    /// Current fulfilled capacity of each group.
    pub group_fulfilled: BTreeMap<String, f64>,
    /// Target each group is being moved to.
    pub group_targets: BTreeMap<String, f64>,
    pub max_weight_to_remove: f64,
    pub max_tasks_to_kill: TaskKillLimit,
}

/// Walk `candidates` in order and pick nodes to remove.
///
/// A node is skipped if removing it would exceed `max_weight_to_remove`,
/// drop its group below the group's target, exceed `max_tasks_to_kill`,
/// or (for non-orphans) drop non-orphan capacity below the new target.
pub fn select_nodes_to_prune(
    candidates: Vec<ClusterNodeMetadata>,
    budget: &PruneBudget,
) -> NodesByGroup {
    let mut marked = NodesByGroup::new();
    let mut current = budget.fulfilled_capacity;
    if current <= budget.new_target_capacity {
        return marked;
    }

    let mut remaining_group = budget.group_fulfilled.clone();
    let mut remaining_non_orphan = budget.non_orphan_fulfilled_capacity;
    let mut removed_weight = 0.0;
    let mut killed_tasks = 0u64;

    for node in candidates {
        let instance_id = &node.instance.instance_id;
        let group_id = &node.instance.group_id;
        let weight = node.instance.weight;
        let tasks = node.agent.task_count;
        let orphaned = node.agent.state == AgentState::Orphaned;

        let (Some(&group_remaining), Some(&group_target)) = (
            remaining_group.get(group_id),
            budget.group_targets.get(group_id),
        ) else {
            debug!(%instance_id, %group_id, "node belongs to an unknown resource group; skipping");
            continue;
        };

        if removed_weight + weight > budget.max_weight_to_remove {
            debug!(
                %instance_id,
                weight,
                max_weight_to_remove = budget.max_weight_to_remove,
                "removing node would take us over our max_weight_to_remove; skipping"
            );
            continue;
        }
        if group_remaining - weight < group_target {
            debug!(%instance_id, %group_id, "resource group is at target capacity; skipping");
            continue;
        }
        if budget.max_tasks_to_kill.is_exceeded_by(killed_tasks + tasks) {
            debug!(
                %instance_id,
                tasks,
                max_tasks_to_kill = ?budget.max_tasks_to_kill,
                "removing node would take us over our max_tasks_to_kill; skipping"
            );
            continue;
        }
        if !orphaned && remaining_non_orphan - weight < budget.new_target_capacity {
            debug!(
                %instance_id,
                weight,
                "removing node would take us under our target_capacity for non-orphan nodes; skipping"
            );
            continue;
        }

        info!(%instance_id, %group_id, "marking node for termination");
        if let Some(rem) = remaining_group.get_mut(group_id) {
            *rem -= weight;
        }
        current -= weight;
        killed_tasks += tasks;
        removed_weight += weight;
        if !orphaned {
            remaining_non_orphan -= weight;
        }
        marked.entry(group_id.clone()).or_default().push(node);

        if current <= budget.new_target_capacity {
            info!("picked enough nodes to reach target capacity");
            break;
        }
    }
    marked
}

impl PoolManager {
    /// Running, killable nodes in kill order.
    pub fn prioritized_killable_nodes(&self) -> PoolResult<Vec<ClusterNodeMetadata>> {
        let nodes = self.get_node_metadatas(Some(RUNNING_STATES))?;
        Ok(prioritize_killable_nodes(
            nodes,
            self.config.scaling_limits.max_tasks_to_kill,
        ))
    }

    /// Choose nodes to remove so fulfilled capacity approaches
    /// `new_target_capacity`.
    ///
    /// `group_targets` defaults to the groups' current targets; pass the
    /// freshly computed ones so dry runs see the intended state.
    pub fn choose_nodes_to_prune(
        &self,
        new_target_capacity: f64,
        group_targets: Option<&BTreeMap<String, f64>>,
    ) -> PoolResult<NodesByGroup> {
        let fulfilled_capacity = self.fulfilled_capacity();
        if fulfilled_capacity <= new_target_capacity {
            return Ok(NodesByGroup::new());
        }

        let candidates = self.prioritized_killable_nodes()?;
        info!(
            order = ?candidates.iter().map(|n| n.instance.instance_id.as_str()).collect::<Vec<_>>(),
            "killable instances in kill order"
        );
        if candidates.is_empty() {
            return Ok(NodesByGroup::new());
        }

        let group_targets = match group_targets {
            Some(t) => t.clone(),
            None => self
                .resource_groups
                .iter()
                .map(|(id, g)| (id.clone(), g.target_capacity()))
                .collect(),
        };
        let limits = &self.config.scaling_limits;
        let budget = PruneBudget {
            new_target_capacity,
            fulfilled_capacity,
            non_orphan_fulfilled_capacity: self.non_orphan_fulfilled_capacity,
            group_fulfilled: self
                .resource_groups
                .iter()
                .map(|(id, g)| (id.clone(), g.fulfilled_capacity()))
                .collect(),
            group_targets,
            max_weight_to_remove: limits.max_weight_to_remove,
            max_tasks_to_kill: limits.max_tasks_to_kill,
        };
        Ok(select_nodes_to_prune(candidates, &budget))
    }

    /// Remove excess fulfilled capacity, either through the draining client
    /// or by terminating directly. Returns the nodes chosen; nothing is
    /// touched in a dry run.
    pub fn prune_excess_fulfilled_capacity(
        &mut self,
        new_target_capacity: f64,
        group_targets: Option<&BTreeMap<String, f64>>,
        dry_run: bool,
    ) -> PoolResult<NodesByGroup> {
        let marked = self.choose_nodes_to_prune(new_target_capacity, group_targets)?;
        if !dry_run {
            self.remove_nodes(&marked)?;
        }
        Ok(marked)
    }

    /// Hand `marked` to the draining client, or terminate directly when
    /// draining is off. Groups no longer in the pool are skipped.
    pub(crate) fn remove_nodes(&mut self, marked: &NodesByGroup) -> PoolResult<()> {
        if self.config.draining_enabled {
            let client = self.draining_client.as_ref().ok_or_else(|| {
                PoolError::Config("draining is enabled but no draining client is set".to_string())
            })?;
            for (group_id, nodes) in marked {
                let Some(group) = self.resource_groups.get(group_id) else {
                    warn!(%group_id, "resource group disappeared before draining; skipping");
                    continue;
                };
                let sender = group.kind();
                for node in nodes {
                    client
                        .submit_instance_for_draining(&node.instance, sender, &self.key.scheduler)
                        .map_err(PoolError::Draining)?;
                }
            }
        } else {
            for (group_id, nodes) in marked {
                let Some(group) = self.resource_groups.get_mut(group_id) else {
                    warn!(%group_id, "resource group disappeared before termination; skipping");
                    continue;
                };
                let ids: Vec<String> = nodes.iter().map(|n| n.instance.instance_id.clone()).collect();
                let terminated = group.terminate_instances_by_id(&ids).map_err(|source| {
                    PoolError::ResourceGroup {
                        group_id: group_id.clone(),
                        source,
                    }
                })?;
                info!(%group_id, terminated = ?terminated, "terminated instances");
            }
        }
        Ok(())
    }
}
