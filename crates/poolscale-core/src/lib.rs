//! poolscale-core — shared types and configuration for poolscale.
//!
//! The data model mirrors what the decision engine sees each cycle:
//! resource requests produced by signals, fixed-shape cluster resource
//! records, and the per-node join of scheduler agent state with cloud
//! instance metadata. Pool configuration is read from TOML.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AutoscalingConfig, AutoscalingOverrides, DefaultsConfig, PoolConfig, ScalingLimits,
    SignalConfig, TaskKillLimit,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
