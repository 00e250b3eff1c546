//! poolscale-pool — capacity distribution and node pruning for one pool.
//!
//! A pool is a set of resource groups whose instances all run agents of
//! one scheduler. The `PoolManager` sums their capacity, spreads a new
//! aggregate target across them, and removes surplus nodes when
//! fulfilled capacity runs ahead of the target.
//!
//! # Architecture
//!
//! ```text
//! PoolManager::modify_target_capacity(new, dry_run, force, prune)
//!   ├── constrain_target_capacity        (min/max, max_weight_to_add/remove)
//!   ├── compute_new_resource_group_targets  (one unit at a time, ties by id)
//!   ├── ResourceGroup::modify_target_capacity  (failures counted, skipped)
//!   └── prune_excess_fulfilled_capacity
//!         ├── prioritize_killable_nodes  (orphaned, idle, stale, batch, tasks)
//!         ├── select_nodes_to_prune      (weight/group/task/non-orphan limits)
//!         └── DrainingClient or ResourceGroup::terminate_instances_by_id
//! ```
//!
//! Resource groups are built from pool config by a `ResourceGroupRegistry`
//! of per-kind loaders. Scheduler state comes from a `ClusterConnector`.

pub mod connector;
pub mod draining;
pub mod error;
pub mod manager;
pub mod manual;
pub mod prune;
pub mod resource_group;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::ClusterConnector;
pub use draining::DrainingClient;
pub use error::{PoolError, PoolResult, ResourceGroupError};
pub use manager::{PoolManager, RUNNING_STATES};
pub use manual::parse_target_capacity;
pub use prune::{
    NodesByGroup, PruneBudget, is_killable, kill_priority, prioritize_killable_nodes,
    select_nodes_to_prune,
};
pub use resource_group::{
    ResourceGroup, ResourceGroupLoader, ResourceGroupMap, ResourceGroupRegistry,
};
pub use status::{GroupStatus, PoolStatus, StatusFilter};
