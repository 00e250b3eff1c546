//! Target-capacity policy.
//!
//! Pure functions from a resource request and a snapshot of the pool to a
//! new aggregate target. Nothing here touches the pool or the store; the
//! cold-start history lookup is passed in and only called when needed.

use poolscale_core::{AutoscalingConfig, ClusterResources, ResourceRequest};
use tracing::{info, warn};

use crate::error::{AutoscaleError, AutoscaleResult};

/// The pool as the policy sees it at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitySnapshot {
    pub target_capacity: f64,
    pub non_orphan_fulfilled_capacity: f64,
    pub total_resources: ClusterResources,
}

/// The resource that would be most utilized if `request` were fulfilled
/// with the current cluster, and its utilization.
///
/// Resources with no opinion or in `excluded_resources` are ignored; ties
/// go to the first resource in `cpus, mem, disk, gpus` order. Returns
/// `None` when nothing is left to compare.
pub fn most_constrained_resource(
    request: &ResourceRequest,
    totals: &ClusterResources,
    config: &AutoscalingConfig,
) -> AutoscaleResult<Option<(&'static str, f64)>> {
    let mut best: Option<(&'static str, f64)> = None;
    for (resource, total) in totals.iter() {
        let Some(requested) = request.get(resource) else {
            continue;
        };
        if config.is_excluded(resource) {
            info!(%resource, requested, "resource is excluded from scaling decisions");
            continue;
        }
        let usage = if total == 0.0 {
            if requested > 0.0 {
                return Err(AutoscaleError::ResourceRequest {
                    resource: resource.to_string(),
                    requested,
                });
            }
            0.0
        } else {
            requested / total
        };
        if best.is_none_or(|(_, u)| usage > u) {
            best = Some((resource, usage));
        }
    }
    Ok(best)
}

/// Compute the new aggregate target capacity for `request`.
///
/// `historical_weights` yields, per resource, how much of it one unit of
/// weighted capacity has recently provided (0 when unknown). It is only
/// consulted on cold start, when the current target is 0.
pub fn compute_target_capacity(
    request: &ResourceRequest,
    snapshot: &CapacitySnapshot,
    config: &AutoscalingConfig,
    historical_weights: impl FnOnce() -> AutoscaleResult<ClusterResources>,
) -> AutoscaleResult<f64> {
    let current = snapshot.target_capacity;
    let fulfilled = snapshot.non_orphan_fulfilled_capacity;
    info!(
        target_capacity = current,
        non_orphan_fulfilled_capacity = fulfilled,
        total_resources = ?snapshot.total_resources,
        "computing target capacity"
    );

    if request.has_no_opinion() {
        info!("no data from signal; not changing capacity");
        return Ok(current);
    }
    if request.is_zero() {
        return Ok(0.0);
    }
    if current == 0.0 {
        info!("target capacity is 0 with a non-zero request; using historical data");
        let weights = historical_weights()?;
        let best = weights
            .iter()
            .filter(|(_, weight)| *weight != 0.0)
            .map(|(resource, weight)| request.get(resource).unwrap_or(0.0) / weight)
            .reduce(f64::max);
        return Ok(match best {
            Some(capacity) => {
                info!(historical = ?weights, max_weighted_capacity_request = capacity, "using historical data");
                capacity / config.setpoint
            }
            None => {
                info!("no historical data found; scaling up by 1 to get some data");
                1.0
            }
        });
    }
    if fulfilled == 0.0 {
        info!(
            "non-orphan fulfilled capacity is 0 and target capacity > 0; waiting for new instances to join"
        );
        return Ok(current);
    }

    let Some((resource, usage)) =
        most_constrained_resource(request, &snapshot.total_resources, config)?
    else {
        warn!("every requested resource is excluded from scaling decisions; not changing capacity");
        return Ok(current);
    };
    info!(%resource, usage, "most constrained resource if request is fulfilled");

    // Scale off what is actually present, not the target, so stale groups
    // and unfulfilled capacity don't compound.
    let scale_factor = usage / config.setpoint;
    let new_target = fulfilled * scale_factor;

    let change = (new_target - current).abs() / current;
    if change >= config.target_capacity_margin {
        info!(
            from = current,
            to = new_target,
            change,
            margin = config.target_capacity_margin,
            "change exceeds margin; scaling"
        );
        Ok(new_target)
    } else {
        info!(
            change,
            margin = config.target_capacity_margin,
            "within target capacity margin; not changing capacity"
        );
        Ok(current)
    }
}
