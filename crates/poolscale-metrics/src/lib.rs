//! poolscale-metrics — observability for autoscaling decisions.
//!
//! A small in-process registry of gauges and counters keyed by metric
//! name and dimensions. Nothing here feeds back into decisions; it only
//! records what the autoscaler and pool manager did.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry (Clone, shared)
//!   ├── gauge(name, dims)   → Gauge::set(value, extra_dims)
//!   ├── counter(name, dims) → Counter::count()
//!   └── snapshot()          → render_prometheus() for scraping
//! ```

pub mod prometheus;
pub mod registry;

pub use prometheus::render_prometheus;
pub use registry::{Counter, Dimensions, Gauge, MetricsRegistry, MetricsSnapshot};

/// Target capacity chosen by the autoscaler, tagged with `dry_run`.
pub const TARGET_CAPACITY_GAUGE: &str = "poolscale.autoscaler.target_capacity";

/// Failures isolated while applying per-group targets.
pub const RESOURCE_GROUP_MODIFICATION_FAILED: &str = "poolscale.resource_group_modification_failed";

/// Name of the gauge for the amount of `resource` a signal requested.
pub fn requested_resource_gauge(resource: &str) -> String {
    format!("poolscale.autoscaler.requested_{resource}")
}
