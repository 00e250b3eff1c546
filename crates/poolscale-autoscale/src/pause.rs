//! Operator pause flags, as seen by the autoscaler.

use poolscale_state::StateStore;

/// Whether autoscaling is paused for a `{cluster}.{pool}.{scheduler}` key.
pub trait PauseCheck: Send {
    fn is_paused(&self, key: &str, now: u64) -> anyhow::Result<bool>;
}

impl PauseCheck for StateStore {
    fn is_paused(&self, key: &str, now: u64) -> anyhow::Result<bool> {
        Ok(self.autoscaler_is_paused(key, now)?)
    }
}

/// Never paused. For simulations and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPaused;

impl PauseCheck for NeverPaused {
    fn is_paused(&self, _key: &str, _now: u64) -> anyhow::Result<bool> {
        Ok(false)
    }
}
