//! Resource groups and the registry that builds them from config.
//!
//! A resource group is one homogeneous, independently managed set of
//! cloud instances (an auto scaling group, a spot fleet, ...). Pool config
//! lists groups as single-key tables, `{ <kind> = { ... } }`; the registry
//! maps each kind to a loader that turns the inner table into groups.

use std::collections::BTreeMap;

use poolscale_core::{InstanceMarket, InstanceMetadata};
use tracing::{error, info};

use crate::error::{PoolError, PoolResult, ResourceGroupError};

/// One group of instances whose capacity is managed as a unit.
pub trait ResourceGroup: Send {
    fn id(&self) -> &str;

    /// The registry kind this group was loaded under, e.g. `sfr`.
    fn kind(&self) -> &str;

    /// Provider-specific status string, e.g. `active` or `modifying`.
    fn status(&self) -> String;

    /// Desired weighted capacity.
    fn target_capacity(&self) -> f64;

    /// Weighted capacity actually running.
    fn fulfilled_capacity(&self) -> f64;

    fn min_capacity(&self) -> f64;

    fn max_capacity(&self) -> f64;

    /// A stale group is pinned to zero target capacity while its
    /// instances are still tracked.
    fn is_stale(&self) -> bool;

    fn instance_ids(&self) -> Vec<String>;

    /// Weight of one instance in `market`.
    fn market_weight(&self, market: &InstanceMarket) -> f64;

    /// Fulfilled capacity per market.
    fn market_capacities(&self) -> BTreeMap<InstanceMarket, f64>;

    /// Instances in this group, optionally restricted to the given cloud
    /// lifecycle states.
    fn get_instance_metadatas(
        &self,
        state_filter: Option<&[&str]>,
    ) -> Result<Vec<InstanceMetadata>, ResourceGroupError>;

    fn modify_target_capacity(
        &mut self,
        target_capacity: f64,
        dry_run: bool,
    ) -> Result<(), ResourceGroupError>;

    /// Terminate instances, returning the ids actually terminated.
    fn terminate_instances_by_id(
        &mut self,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ResourceGroupError>;

    fn mark_stale(&mut self, _dry_run: bool) -> Result<(), ResourceGroupError> {
        Err(ResourceGroupError::MarkStaleUnsupported(self.id().to_string()))
    }
}

/// Groups owned by a pool manager, keyed by id.
pub type ResourceGroupMap = BTreeMap<String, Box<dyn ResourceGroup>>;

/// Builds the groups described by one config entry.
///
/// Arguments are `(cluster, pool, config)`.
pub type ResourceGroupLoader = Box<
    dyn Fn(&str, &str, &toml::Value) -> Result<ResourceGroupMap, ResourceGroupError>
        + Send
        + Sync,
>;

/// Resource group loaders keyed by config kind.
#[derive(Default)]
pub struct ResourceGroupRegistry {
    loaders: BTreeMap<String, ResourceGroupLoader>,
}

impl ResourceGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader` for entries of the form `{ kind = { ... } }`.
    pub fn register<F>(mut self, kind: &str, loader: F) -> Self
    where
        F: Fn(&str, &str, &toml::Value) -> Result<ResourceGroupMap, ResourceGroupError>
            + Send
            + Sync
            + 'static,
    {
        self.loaders.insert(kind.to_string(), Box::new(loader));
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Load every group described by `entries`.
    ///
    /// Malformed entries and unknown kinds are logged and skipped. A
    /// loader failure aborts the load.
    pub fn load_all(
        &self,
        cluster: &str,
        pool: &str,
        entries: &[toml::Value],
    ) -> PoolResult<ResourceGroupMap> {
        let mut groups = ResourceGroupMap::new();
        for entry in entries {
            let Some((kind, config)) = entry
                .as_table()
                .filter(|t| t.len() == 1)
                .and_then(|t| t.iter().next())
            else {
                error!(%entry, "Malformed config for resource group");
                continue;
            };
            let Some(loader) = self.loaders.get(kind) else {
                error!(%kind, "Unknown resource group kind");
                continue;
            };
            let loaded = loader(cluster, pool, config).map_err(|source| {
                PoolError::LoadResourceGroups {
                    kind: kind.clone(),
                    source,
                }
            })?;
            groups.extend(loaded);
        }
        info!(
            %cluster,
            %pool,
            groups = ?groups.keys().collect::<Vec<_>>(),
            "loaded resource groups"
        );
        Ok(groups)
    }
}
