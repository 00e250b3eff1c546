//! Records persisted by the state store.

use serde::{Deserialize, Serialize};

/// An operator-set pause on autoscaling for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRecord {
    pub paused_at: u64,
    /// Unix seconds after which the pause no longer applies.
    pub expiration_timestamp: Option<u64>,
}

impl PauseRecord {
    /// A pause is in effect at `now` unless it has an expiration that
    /// `now` is strictly past.
    pub fn is_active(&self, now: u64) -> bool {
        self.expiration_timestamp.is_none_or(|exp| now <= exp)
    }
}

/// One timestamped metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetadataPoint {
    pub timestamp: u64,
    pub value: f64,
}

/// Build the table key for a metadata point.
pub fn metadata_key(metric: &str, dimensions: &str, timestamp: u64) -> String {
    format!("{metric}|{dimensions}|{timestamp:020}")
}
