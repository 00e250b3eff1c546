//! Operator-requested target changes.

use poolscale_core::ScalingLimits;

use crate::error::{PoolError, PoolResult};

/// Parse a manual target: `min` or `max` resolve to the pool's scaling
/// limits, anything else must be a non-negative integer.
pub fn parse_target_capacity(input: &str, limits: &ScalingLimits) -> PoolResult<f64> {
    match input.trim().to_ascii_lowercase().as_str() {
        "min" => Ok(limits.min_capacity),
        "max" => Ok(limits.max_capacity),
        other => other
            .parse::<u64>()
            .map(|n| n as f64)
            .map_err(|_| PoolError::InvalidTargetCapacity(input.to_string())),
    }
}
