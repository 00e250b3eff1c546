//! poolscale-autoscale — turns signal requests into target capacity.
//!
//! One `Autoscaler` drives one pool. It never talks to the cloud itself;
//! every change goes through the pool's `PoolManager`.
//!
//! # Decision cycle
//!
//! ```text
//! run(timestamp, dry_run)
//!   ├── paused?                           → no-op
//!   ├── app signal (retry once on broken connection)
//!   │     └── on failure: default signal, remember the failure
//!   ├── PoolManager::reload_state
//!   ├── compute_target_capacity
//!   │     all None        → keep target
//!   │     all 0 / None    → 0
//!   │     target == 0     → max(request / historical weight) / setpoint, else 1
//!   │     fulfilled == 0  → keep target (waiting for nodes to join)
//!   │     otherwise       → fulfilled * most_constrained_usage / setpoint,
//!   │                       kept unchanged if within target_capacity_margin
//!   ├── gauges (target capacity, requested resources)
//!   ├── PoolManager::modify_target_capacity
//!   └── report the app signal failure, if any
//! ```

pub mod error;
pub mod history;
pub mod pause;
pub mod policy;
pub mod scaler;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AutoscaleError, AutoscaleResult, SignalError};
pub use history::{MetadataCollector, historical_weighted_resources, smoothed_non_zero};
pub use pause::{NeverPaused, PauseCheck};
pub use policy::{CapacitySnapshot, compute_target_capacity, most_constrained_resource};
pub use scaler::{Autoscaler, AutoscalerSignals, SIGNAL_RETRY_DELAY};
pub use signal::{Signal, SignalSettings, evaluate_with_retry};
