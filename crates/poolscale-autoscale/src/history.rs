//! Metadata history: what each unit of capacity has recently provided.
//!
//! Every cycle the collector records the pool's capacities and resource
//! totals. On cold start the autoscaler reads them back to translate a
//! resource request into weighted capacity.

use poolscale_core::{ClusterResources, PoolKey, RESOURCE_NAMES};
use poolscale_pool::{PoolError, PoolManager};
use poolscale_state::{MetadataPoint, StateError, StateResult, StateStore};
use tracing::{debug, info};

use crate::error::AutoscaleResult;

pub const NON_ORPHAN_FULFILLED_CAPACITY: &str = "non_orphan_fulfilled_capacity";
pub const FULFILLED_CAPACITY: &str = "fulfilled_capacity";
pub const TARGET_CAPACITY: &str = "target_capacity";

/// How far back cold start looks for history.
pub const HISTORY_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Number of non-zero points averaged by default.
pub const DEFAULT_SMOOTHING: usize = 5;

pub fn resource_total_metric(resource: &str) -> String {
    format!("{resource}_total")
}

pub fn resource_allocated_metric(resource: &str) -> String {
    format!("{resource}_allocated")
}

/// Average of the last `smoothing` non-zero points.
///
/// Returns `(first_timestamp, last_timestamp, mean)` over the points
/// used, or `None` if there are no non-zero points.
pub fn smoothed_non_zero(points: &[MetadataPoint], smoothing: usize) -> Option<(u64, u64, f64)> {
    let non_zero: Vec<&MetadataPoint> = points.iter().filter(|p| p.value > 0.0).collect();
    let latest = &non_zero[non_zero.len().saturating_sub(smoothing)..];
    let (first, last) = (latest.first()?, latest.last()?);
    let mean = latest.iter().map(|p| p.value).sum::<f64>() / latest.len() as f64;
    Some((first.timestamp, last.timestamp, mean))
}

/// Read and smooth `metric` for `key` over `[start, end]`.
pub fn smoothed_metadata(
    store: &StateStore,
    key: &PoolKey,
    metric: &str,
    start: u64,
    end: u64,
) -> StateResult<Option<(u64, u64, f64)>> {
    let points = store.metadata_values(metric, &key.dimensions(), start, end)?;
    Ok(smoothed_non_zero(&points, DEFAULT_SMOOTHING))
}

/// Per resource, the recent total divided by the recent non-orphan
/// fulfilled capacity; 0 where unknown.
///
/// Capacity is read over the week before `now`; resource totals over the
/// span the smoothed capacity came from.
pub fn historical_weighted_resources(
    store: &StateStore,
    key: &PoolKey,
    now: u64,
) -> StateResult<ClusterResources> {
    let Some((start, end, capacity)) = smoothed_metadata(
        store,
        key,
        NON_ORPHAN_FULFILLED_CAPACITY,
        now.saturating_sub(HISTORY_WINDOW_SECS),
        now,
    )?
    else {
        return Ok(ClusterResources::default());
    };

    let weights = ClusterResources::try_from_fn(|resource| {
        let total = smoothed_metadata(store, key, &resource_total_metric(resource), start, end)?;
        Ok::<_, StateError>(total.map_or(0.0, |(_, _, value)| value / capacity))
    })?;
    debug!(pool = %key, ?weights, "historical weighted resources");
    Ok(weights)
}

/// Records a pool's capacity and resources into the state store.
#[derive(Clone)]
pub struct MetadataCollector {
    store: StateStore,
}

impl MetadataCollector {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Write one sample of every metadata metric at `timestamp`. Target
    /// capacity is skipped when every resource group is stale.
    pub fn collect(&self, manager: &PoolManager, timestamp: u64) -> AutoscaleResult<()> {
        let key = manager.key();
        let dims = key.dimensions();
        let put = |metric: &str, value: f64| {
            self.store.put_metadata(metric, &dims, timestamp, value)
        };

        put(NON_ORPHAN_FULFILLED_CAPACITY, manager.non_orphan_fulfilled_capacity())?;
        put(FULFILLED_CAPACITY, manager.fulfilled_capacity())?;
        match manager.target_capacity() {
            Ok(target) => put(TARGET_CAPACITY, target)?,
            Err(PoolError::AllResourceGroupsAreStale) => {
                info!(pool = %key, "all resource groups are stale; not recording target capacity");
            }
            Err(e) => return Err(e.into()),
        }

        let connector = manager.connector();
        for resource in RESOURCE_NAMES {
            put(&resource_total_metric(resource), connector.get_resource_total(resource))?;
            put(
                &resource_allocated_metric(resource),
                connector.get_resource_allocation(resource),
            )?;
        }
        debug!(pool = %key, timestamp, "collected pool metadata");
        Ok(())
    }
}
