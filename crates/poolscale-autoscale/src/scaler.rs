//! Autoscaler — one decision cycle per tick.
//!
//! Each call to [`Autoscaler::run`] checks the pause flag, asks the app
//! signal for a resource request (falling back to the default signal),
//! reloads the pool, computes a new target capacity, records it, and hands
//! it to the pool manager. A failed app signal is reported only after the
//! fallback's change has been applied.

use std::time::Duration;

use poolscale_core::{AutoscalingConfig, ResourceRequest, RESOURCE_NAMES};
use poolscale_metrics::{
    Gauge, MetricsRegistry, TARGET_CAPACITY_GAUGE, requested_resource_gauge,
};
use poolscale_pool::PoolManager;
use poolscale_state::StateStore;
use tracing::{error, info};

use crate::error::{AutoscaleError, AutoscaleResult, SignalError};
use crate::history::historical_weighted_resources;
use crate::pause::PauseCheck;
use crate::policy::{CapacitySnapshot, compute_target_capacity};
use crate::signal::{Signal, evaluate_with_retry};

/// Wait before retrying a signal whose connection broke.
pub const SIGNAL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The signals an autoscaler is built with.
pub struct AutoscalerSignals {
    /// Used when the pool has no app signal, or when it fails.
    pub default: Box<dyn Signal>,
    /// At most one app signal per pool.
    pub apps: Vec<Box<dyn Signal>>,
}

pub struct Autoscaler {
    pool_manager: PoolManager,
    config: AutoscalingConfig,
    app_signal: Option<Box<dyn Signal>>,
    default_signal: Box<dyn Signal>,
    history: StateStore,
    pause: Box<dyn PauseCheck>,
    monitoring_enabled: bool,
    retry_delay: Duration,
    target_capacity_gauge: Gauge,
    requested_gauges: Vec<(&'static str, Gauge)>,
}

impl Autoscaler {
    /// Create an autoscaler for the pool `pool_manager` manages.
    ///
    /// Pause flags and cold-start history are both read from `history`.
    pub fn new(
        pool_manager: PoolManager,
        config: AutoscalingConfig,
        signals: AutoscalerSignals,
        history: StateStore,
        metrics: &MetricsRegistry,
    ) -> AutoscaleResult<Self> {
        let AutoscalerSignals { default, mut apps } = signals;
        if apps.len() > 1 {
            return Err(AutoscaleError::MultipleApps(apps.len()));
        }
        config.validate()?;

        let key = pool_manager.key();
        info!(cluster = %key.cluster, pool = %key.pool, "initializing autoscaler");
        let dims = [("cluster", key.cluster.as_str()), ("pool", key.pool.as_str())];
        let target_capacity_gauge = metrics.gauge(TARGET_CAPACITY_GAUGE, &dims);
        let requested_gauges = RESOURCE_NAMES
            .iter()
            .map(|r| (*r, metrics.gauge(&requested_resource_gauge(r), &dims)))
            .collect();

        let app_signal = apps.pop();
        if app_signal.is_none() {
            info!(pool = %key, "no app signal configured; using the default signal");
        }
        Ok(Self {
            pool_manager,
            config,
            app_signal,
            default_signal: default,
            pause: Box::new(history.clone()),
            history,
            monitoring_enabled: true,
            retry_delay: SIGNAL_RETRY_DELAY,
            target_capacity_gauge,
            requested_gauges,
        })
    }

    /// Replace the pause check, which defaults to the history store.
    pub fn with_pause_check(mut self, pause: Box<dyn PauseCheck>) -> Self {
        self.pause = pause;
        self
    }

    /// Disable to stop writing gauges, e.g. for simulations.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn pool_manager(&self) -> &PoolManager {
        &self.pool_manager
    }

    pub fn pool_manager_mut(&mut self) -> &mut PoolManager {
        &mut self.pool_manager
    }

    /// The active signal: the app's, or the default if there is none.
    pub fn signal(&self) -> &dyn Signal {
        self.app_signal.as_deref().unwrap_or(self.default_signal.as_ref())
    }

    /// How often [`run`](Self::run) should be called.
    pub fn run_frequency(&self) -> Duration {
        Duration::from_secs(self.signal().period_minutes() * 60)
    }

    /// Run one autoscaling cycle at `timestamp` (unix seconds).
    ///
    /// Returns the target capacity applied, or `None` when paused. If the
    /// app signal failed, the default signal's request is applied and then
    /// [`AutoscaleError::SignalFailed`] is returned.
    pub fn run(&mut self, timestamp: u64, dry_run: bool) -> AutoscaleResult<Option<f64>> {
        let key = self.pool_manager.key().clone();
        info!(pool = %key, timestamp, dry_run, "autoscaling run starting");
        if self
            .pause
            .is_paused(&key.pause_key(), timestamp)
            .map_err(AutoscaleError::PauseCheck)?
        {
            info!(pool = %key, "autoscaling is currently paused; doing nothing");
            return Ok(None);
        }

        let (signal_name, request, failure) = self.evaluate_signals(timestamp)?;
        info!(signal = %signal_name, ?request, "signal requested resources");

        self.pool_manager.reload_state()?;
        let new_target_capacity = self.compute_target_capacity(&request, timestamp)?;
        if self.monitoring_enabled {
            self.emit_gauges(new_target_capacity, &request, dry_run);
        }

        let applied =
            self.pool_manager
                .modify_target_capacity(new_target_capacity, dry_run, false, true)?;

        if let Some((signal, source)) = failure {
            error!(%signal, error = %source, "the client signal failed");
            return Err(AutoscaleError::SignalFailed { signal, source });
        }
        Ok(Some(applied))
    }

    /// Evaluate the app signal, falling back to the default one. Returns
    /// the name of the signal used, its request, and the app failure if
    /// there was one.
    fn evaluate_signals(
        &mut self,
        timestamp: u64,
    ) -> AutoscaleResult<(String, ResourceRequest, Option<(String, SignalError)>)> {
        let mut failure = None;
        if let Some(signal) = self.app_signal.as_deref_mut() {
            match evaluate_with_retry(signal, timestamp, self.retry_delay) {
                Ok(request) => return Ok((signal.name().to_string(), request, None)),
                Err(e) => {
                    error!(signal = signal.name(), error = %e, "client signal failed; using default signal");
                    failure = Some((signal.name().to_string(), e));
                }
            }
        }

        let name = self.default_signal.name().to_string();
        let request = evaluate_with_retry(self.default_signal.as_mut(), timestamp, self.retry_delay)
            .map_err(|source| AutoscaleError::DefaultSignalFailed {
                signal: name.clone(),
                source,
            })?;
        Ok((name, request, failure))
    }

    fn compute_target_capacity(
        &self,
        request: &ResourceRequest,
        timestamp: u64,
    ) -> AutoscaleResult<f64> {
        let manager = &self.pool_manager;
        let connector = manager.connector();
        let snapshot = CapacitySnapshot {
            target_capacity: manager.target_capacity()?,
            non_orphan_fulfilled_capacity: manager.non_orphan_fulfilled_capacity(),
            total_resources: connector.get_cluster_total_resources(),
        };
        info!(
            allocated_resources = ?connector.get_cluster_allocated_resources(),
            "current cluster allocation"
        );
        compute_target_capacity(request, &snapshot, &self.config, || {
            Ok(historical_weighted_resources(
                &self.history,
                manager.key(),
                timestamp,
            )?)
        })
    }

    fn emit_gauges(&self, target_capacity: f64, request: &ResourceRequest, dry_run: bool) {
        let dry_run = [("dry_run", if dry_run { "true" } else { "false" })];
        self.target_capacity_gauge.set(target_capacity, &dry_run);
        for (resource, gauge) in &self.requested_gauges {
            if let Some(value) = request.get(resource) {
                gauge.set(value, &dry_run);
            }
        }
    }
}
