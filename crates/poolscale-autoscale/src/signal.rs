//! Signals — the source of resource requests.
//!
//! A signal is evaluated once per autoscaling cycle and answers "how much
//! of each resource does this pool need right now". Concrete signals live
//! outside this crate; here is the interface, the shared settings every
//! signal reads from config, and the one-shot retry used on broken
//! connections.

use std::time::Duration;

use poolscale_core::{PoolKey, ResourceRequest, SignalConfig};
use tracing::warn;

use crate::error::SignalError;

pub trait Signal: Send {
    fn name(&self) -> &str;

    /// How often the signal should be evaluated.
    fn period_minutes(&self) -> u64;

    /// Compute the aggregate resource request as of `timestamp` (unix
    /// seconds).
    fn evaluate(&mut self, timestamp: u64) -> Result<ResourceRequest, SignalError>;

    /// Re-establish the connection to the signal after a
    /// [`SignalError::Connection`].
    fn reconnect(&mut self) -> Result<(), SignalError> {
        Ok(())
    }
}

/// Evaluate `signal`; on a connection failure, reconnect, wait `delay`,
/// and try exactly once more.
pub fn evaluate_with_retry(
    signal: &mut dyn Signal,
    timestamp: u64,
    delay: Duration,
) -> Result<ResourceRequest, SignalError> {
    match signal.evaluate(timestamp) {
        Err(SignalError::Connection(reason)) => {
            warn!(signal = signal.name(), %reason, "signal connection broken; reconnecting");
            signal.reconnect()?;
            std::thread::sleep(delay);
            signal.evaluate(timestamp)
        }
        other => other,
    }
}

/// Settings every signal is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSettings {
    pub name: String,
    pub period_minutes: u64,
    /// Flattened parameters; `cluster` and `pool` always come from the pool.
    pub parameters: toml::Table,
}

impl SignalSettings {
    pub fn from_config(config: &SignalConfig, key: &PoolKey) -> Result<Self, SignalError> {
        config
            .validate()
            .map_err(|e| SignalError::Validation(e.to_string()))?;
        let period_minutes = u64::try_from(config.period_minutes).map_err(|_| {
            SignalError::Validation(format!(
                "length of signal period must be positive, got {}",
                config.period_minutes
            ))
        })?;
        Ok(Self {
            name: config.name.clone(),
            period_minutes,
            parameters: config.parameters_for(&key.cluster, &key.pool),
        })
    }
}
