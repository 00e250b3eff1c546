//! PoolManager — owns a pool's resource groups and sizes them.
//!
//! Each cycle the manager re-reads everything (connector state, resource
//! groups, non-orphan capacity) and then, given a requested aggregate
//! target, constrains it by the pool's scaling limits, spreads it across
//! groups one unit at a time, applies the per-group targets, and prunes
//! any excess fulfilled capacity.

use std::collections::BTreeMap;

use poolscale_core::{
    AgentState, ClusterNodeMetadata, InstanceMarket, PoolConfig, PoolKey, ScalingLimits,
};
use poolscale_metrics::{MetricsRegistry, RESOURCE_GROUP_MODIFICATION_FAILED};
use tracing::{error, info, warn};

use crate::connector::ClusterConnector;
use crate::draining::DrainingClient;
use crate::error::{PoolError, PoolResult, ResourceGroupError};
use crate::resource_group::{ResourceGroup, ResourceGroupMap, ResourceGroupRegistry};

/// Cloud lifecycle states counted as live capacity.
pub const RUNNING_STATES: &[&str] = &["running"];

pub struct PoolManager {
    pub(crate) key: PoolKey,
    pub(crate) config: PoolConfig,
    pub(crate) connector: Box<dyn ClusterConnector>,
    pub(crate) draining_client: Option<Box<dyn DrainingClient>>,
    registry: ResourceGroupRegistry,
    metrics: MetricsRegistry,
    pub(crate) resource_groups: ResourceGroupMap,
    pub(crate) non_orphan_fulfilled_capacity: f64,
}

impl PoolManager {
    /// Create a manager. No state is read until [`reload_state`](Self::reload_state).
    ///
    /// A draining client is required when the pool enables draining.
    pub fn new(
        key: PoolKey,
        config: PoolConfig,
        connector: Box<dyn ClusterConnector>,
        draining_client: Option<Box<dyn DrainingClient>>,
        registry: ResourceGroupRegistry,
        metrics: MetricsRegistry,
    ) -> PoolResult<Self> {
        if config.draining_enabled && draining_client.is_none() {
            return Err(PoolError::Config(format!(
                "draining is enabled for {key} but no draining client was provided"
            )));
        }
        config
            .validate()
            .map_err(|e| PoolError::Config(e.to_string()))?;
        Ok(Self {
            key,
            config,
            connector,
            draining_client,
            registry,
            metrics,
            resource_groups: ResourceGroupMap::new(),
            non_orphan_fulfilled_capacity: 0.0,
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn scaling_limits(&self) -> &ScalingLimits {
        &self.config.scaling_limits
    }

    pub fn draining_enabled(&self) -> bool {
        self.config.draining_enabled
    }

    pub fn connector(&self) -> &dyn ClusterConnector {
        self.connector.as_ref()
    }

    pub fn resource_groups(&self) -> &ResourceGroupMap {
        &self.resource_groups
    }

    /// Weighted capacity of running instances whose agents the scheduler
    /// knows about, as of the last reload.
    pub fn non_orphan_fulfilled_capacity(&self) -> f64 {
        self.non_orphan_fulfilled_capacity
    }

    // ── State ──────────────────────────────────────────────────────

    /// Re-read connector state, rebuild resource groups from config, and
    /// recompute non-orphan fulfilled capacity.
    pub fn reload_state(&mut self) -> PoolResult<()> {
        info!(pool = %self.key, "reloading cluster connector state");
        self.connector.reload_state()?;

        info!(pool = %self.key, "reloading resource groups");
        self.resource_groups = self.registry.load_all(
            &self.key.cluster,
            &self.key.pool,
            &self.config.resource_groups,
        )?;

        self.non_orphan_fulfilled_capacity = self
            .get_node_metadatas(Some(RUNNING_STATES))?
            .iter()
            .filter(|n| !matches!(n.agent.state, AgentState::Orphaned | AgentState::Unknown))
            .map(|n| n.instance.weight)
            .sum();
        info!(
            pool = %self.key,
            non_orphan_fulfilled_capacity = self.non_orphan_fulfilled_capacity,
            "recalculated non-orphan fulfilled capacity"
        );
        Ok(())
    }

    /// Sum of target capacity over non-stale groups.
    pub fn target_capacity(&self) -> PoolResult<f64> {
        let mut live = self.resource_groups.values().filter(|g| !g.is_stale()).peekable();
        if live.peek().is_none() {
            return Err(PoolError::AllResourceGroupsAreStale);
        }
        Ok(live.map(|g| g.target_capacity()).sum())
    }

    /// Sum of fulfilled capacity over all groups, stale ones included.
    pub fn fulfilled_capacity(&self) -> f64 {
        self.resource_groups
            .values()
            .map(|g| g.fulfilled_capacity())
            .sum()
    }

    /// Fulfilled capacity per market across all groups, optionally limited
    /// to `market_filter`.
    pub fn get_market_capacities(
        &self,
        market_filter: Option<&[InstanceMarket]>,
    ) -> BTreeMap<InstanceMarket, f64> {
        let mut totals = BTreeMap::new();
        for group in self.resource_groups.values() {
            for (market, capacity) in group.market_capacities() {
                if market_filter.is_none_or(|f| f.contains(&market)) {
                    *totals.entry(market).or_insert(0.0) += capacity;
                }
            }
        }
        totals
    }

    /// Every instance in the pool joined with its agent metadata.
    pub fn get_node_metadatas(
        &self,
        state_filter: Option<&[&str]>,
    ) -> PoolResult<Vec<ClusterNodeMetadata>> {
        let mut nodes = Vec::new();
        for (group_id, group) in &self.resource_groups {
            let instances = group.get_instance_metadatas(state_filter).map_err(|source| {
                PoolError::ResourceGroup {
                    group_id: group_id.clone(),
                    source,
                }
            })?;
            nodes.extend(instances.into_iter().map(|instance| ClusterNodeMetadata {
                agent: self.connector.get_agent_metadata(instance.ip_address.as_deref()),
                instance,
            }));
        }
        Ok(nodes)
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Mark every group stale. Groups that do not support it are skipped.
    pub fn mark_stale(&mut self, dry_run: bool) -> PoolResult<()> {
        if dry_run {
            warn!("running in dry-run mode; cluster state will not be modified");
        }
        for (group_id, group) in self.resource_groups.iter_mut() {
            info!(%group_id, "marking resource group stale");
            match group.mark_stale(dry_run) {
                Ok(()) => {}
                Err(e @ ResourceGroupError::MarkStaleUnsupported(_)) => {
                    warn!(%group_id, error = %e, "skipping resource group");
                }
                Err(source) => {
                    return Err(PoolError::ResourceGroup {
                        group_id: group_id.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Constrain `new_target_capacity`, distribute it over the groups,
    /// apply it, and (with `prune`) remove excess fulfilled capacity.
    ///
    /// Returns the target actually set.
    pub fn modify_target_capacity(
        &mut self,
        new_target_capacity: f64,
        dry_run: bool,
        force: bool,
        prune: bool,
    ) -> PoolResult<f64> {
        if dry_run {
            warn!("running in dry-run mode; cluster state will not be modified");
        }
        if self.resource_groups.is_empty() {
            return Err(PoolError::NoResourceGroups);
        }

        let original = self.target_capacity()?;
        let new_target = self.constrain_target_capacity(new_target_capacity, force)?;
        let group_targets = self.compute_new_resource_group_targets(new_target)?;

        for (group_id, target) in &group_targets {
            let Some(group) = self.resource_groups.get_mut(group_id) else {
                continue;
            };
            if let Err(e) = group.modify_target_capacity(*target, dry_run) {
                error!(%group_id, target, error = %e, "failed to modify resource group target");
                self.metrics
                    .counter(
                        RESOURCE_GROUP_MODIFICATION_FAILED,
                        &[("cluster", &self.key.cluster), ("pool", &self.key.pool)],
                    )
                    .count();
            }
        }

        if prune {
            self.prune_excess_fulfilled_capacity(new_target, Some(&group_targets), dry_run)?;
        }
        info!(
            pool = %self.key,
            from = original,
            to = new_target,
            "target capacity changed"
        );
        Ok(new_target)
    }

    /// Clip a requested target to the scaling limits.
    ///
    /// The change is first bounded toward `[min_capacity, max_capacity]`,
    /// then by `max_weight_to_add` / `max_weight_to_remove`. With `force`
    /// the request is returned as-is.
    pub fn constrain_target_capacity(&self, requested: f64, force: bool) -> PoolResult<f64> {
        let limits = &self.config.scaling_limits;
        let current = self.target_capacity()?;
        let requested_delta = requested - current;

        // When the current target is outside the bounds this can flip the
        // sign of the delta, which moves us back toward the bound.
        let mut delta = if requested_delta > 0.0 {
            (limits.max_capacity - current).min(requested_delta)
        } else if requested_delta < 0.0 {
            (limits.min_capacity - current).max(requested_delta)
        } else {
            0.0
        };

        if delta > 0.0 {
            delta = delta.min(limits.max_weight_to_add);
        } else if delta < 0.0 {
            delta = delta.max(-limits.max_weight_to_remove);
        }

        let constrained = current + delta;
        if requested_delta != delta {
            if force {
                let forced = current + requested_delta;
                warn!(
                    forced,
                    constrained, "forcing target capacity past scaling limits"
                );
                return Ok(forced);
            }
            warn!(
                requested,
                constrained, "restricting target capacity due to scaling limits"
            );
        }
        Ok(constrained)
    }

    /// Spread `new_target_capacity` over the groups.
    ///
    /// Stale groups go to 0. Starting from their current targets, the
    /// lowest (scaling up) or highest (scaling down) unconstrained group is
    /// moved one unit at a time, ties broken by id, until the total reaches
    /// `ceil(new_target_capacity)`. If every group is stale or at its
    /// bound first, the closest reachable distribution is returned.
    pub fn compute_new_resource_group_targets(
        &self,
        new_target_capacity: f64,
    ) -> PoolResult<BTreeMap<String, f64>> {
        let coeff = if new_target_capacity < self.target_capacity()? {
            -1.0
        } else {
            1.0
        };

        let mut targets: BTreeMap<String, f64> = self
            .resource_groups
            .iter()
            .map(|(id, g)| (id.clone(), if g.is_stale() { 0.0 } else { g.target_capacity() }))
            .collect();
        // Indexed by map key; a loader may key groups by something other
        // than `id()`.
        let live: Vec<(&String, &dyn ResourceGroup)> = self
            .resource_groups
            .iter()
            .filter(|(_, g)| !g.is_stale())
            .map(|(id, g)| (id, g.as_ref()))
            .collect();

        let goal = new_target_capacity.ceil();
        while targets.values().sum::<f64>() * coeff < goal * coeff {
            let next = live
                .iter()
                .filter(|(id, g)| {
                    let t = targets[*id];
                    if coeff > 0.0 {
                        t + coeff <= g.max_capacity()
                    } else {
                        t + coeff >= g.min_capacity()
                    }
                })
                .min_by(|(a, _), (b, _)| {
                    (coeff * targets[*a])
                        .total_cmp(&(coeff * targets[*b]))
                        .then_with(|| a.cmp(b))
                });
            let Some((id, _)) = next else {
                warn!(
                    requested = new_target_capacity,
                    closest = targets.values().sum::<f64>(),
                    "all resource groups are stale or constrained"
                );
                break;
            };
            if let Some(t) = targets.get_mut(*id) {
                *t += coeff;
            }
        }
        Ok(targets)
    }
}
