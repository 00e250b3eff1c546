//! Autoscaler error types.

use poolscale_core::ConfigError;
use poolscale_pool::PoolError;
use poolscale_state::StateError;
use thiserror::Error;

/// Failure to obtain a resource request from a signal.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Transport to the signal broke; worth one reconnect and retry.
    #[error("signal connection failed: {0}")]
    Connection(String),

    #[error("signal evaluation failed: {0}")]
    Evaluation(String),

    #[error("invalid signal configuration: {0}")]
    Validation(String),
}

/// Errors that can occur during an autoscaling cycle.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("signal requested {requested} {resource} but the cluster doesn't have any of that resource")]
    ResourceRequest { resource: String, requested: f64 },

    /// The app signal failed; the default signal's request was applied.
    #[error("client signal {signal} failed: {source}")]
    SignalFailed {
        signal: String,
        #[source]
        source: SignalError,
    },

    /// The app signal and the default signal both failed; nothing applied.
    #[error("default signal {signal} failed: {source}")]
    DefaultSignalFailed {
        signal: String,
        #[source]
        source: SignalError,
    },

    #[error("scaling multiple apps in a pool is not supported (got {0})")]
    MultipleApps(usize),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pause check failed: {0}")]
    PauseCheck(#[source] anyhow::Error),
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
