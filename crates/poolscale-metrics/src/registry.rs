//! Metrics registry — named gauges and counters with dimensions.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

/// Dimension labels attached to a series, sorted by name.
pub type Dimensions = BTreeMap<String, String>;

type SeriesKey = (String, Dimensions);

/// Point-in-time copy of every series in a registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub gauges: BTreeMap<SeriesKey, f64>,
    pub counters: BTreeMap<SeriesKey, u64>,
}

/// Shared registry of metric series.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<MetricsSnapshot>>,
}

fn dimensions(pairs: &[(&str, &str)]) -> Dimensions {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a series half-written,
    // so poisoned locks are still usable.
    fn read(&self) -> RwLockReadGuard<'_, MetricsSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MetricsSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle to a gauge with the given base dimensions.
    pub fn gauge(&self, name: &str, dims: &[(&str, &str)]) -> Gauge {
        Gauge {
            registry: self.clone(),
            name: name.to_string(),
            dims: dimensions(dims),
        }
    }

    /// Handle to a counter with the given dimensions.
    pub fn counter(&self, name: &str, dims: &[(&str, &str)]) -> Counter {
        Counter {
            registry: self.clone(),
            key: (name.to_string(), dimensions(dims)),
        }
    }

    /// Current value of a gauge series, if it was ever set.
    pub fn gauge_value(&self, name: &str, dims: &[(&str, &str)]) -> Option<f64> {
        self.read()
            .gauges
            .get(&(name.to_string(), dimensions(dims)))
            .copied()
    }

    /// Current value of a counter series; 0 if never counted.
    pub fn counter_value(&self, name: &str, dims: &[(&str, &str)]) -> u64 {
        self.read()
            .counters
            .get(&(name.to_string(), dimensions(dims)))
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.read().clone()
    }
}

/// A settable gauge.
#[derive(Clone)]
pub struct Gauge {
    registry: MetricsRegistry,
    name: String,
    dims: Dimensions,
}

impl Gauge {
    /// Set the series identified by the base dimensions plus `extra`.
    pub fn set(&self, value: f64, extra: &[(&str, &str)]) {
        let mut dims = self.dims.clone();
        dims.extend(dimensions(extra));
        trace!(metric = %self.name, value, "gauge set");
        self.registry
            .write()
            .gauges
            .insert((self.name.clone(), dims), value);
    }
}

/// A monotonically increasing counter.
#[derive(Clone)]
pub struct Counter {
    registry: MetricsRegistry,
    key: SeriesKey,
}

impl Counter {
    pub fn count(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        *self
            .registry
            .write()
            .counters
            .entry(self.key.clone())
            .or_insert(0) += n;
    }
}
