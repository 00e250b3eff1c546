//! Pool configuration parser.
//!
//! Each pool is described by one TOML file. Autoscaling knobs left unset in
//! the pool file fall back to a cluster-wide defaults file, and then to
//! built-in values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::is_known_resource;

pub const DEFAULT_SETPOINT: f64 = 0.7;
pub const DEFAULT_TARGET_CAPACITY_MARGIN: f64 = 0.1;

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ── Scaling limits ─────────────────────────────────────────────────

/// Upper bound on the number of tasks a single prune may kill.
///
/// Written as an integer or the string `"inf"`; defaults to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskKillLimit", into = "RawTaskKillLimit")]
pub enum TaskKillLimit {
    Bounded(u64),
    Unbounded,
}

impl Default for TaskKillLimit {
    fn default() -> Self {
        TaskKillLimit::Bounded(0)
    }
}

impl TaskKillLimit {
    /// True if killing `tasks` tasks in total would go over the limit.
    pub fn is_exceeded_by(&self, tasks: u64) -> bool {
        match self {
            TaskKillLimit::Bounded(max) => tasks > *max,
            TaskKillLimit::Unbounded => false,
        }
    }

    /// True if the limit is strictly greater than `tasks`.
    pub fn is_greater_than(&self, tasks: u64) -> bool {
        match self {
            TaskKillLimit::Bounded(max) => *max > tasks,
            TaskKillLimit::Unbounded => true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTaskKillLimit {
    Count(u64),
    Text(String),
}

impl TryFrom<RawTaskKillLimit> for TaskKillLimit {
    type Error = String;

    fn try_from(raw: RawTaskKillLimit) -> Result<Self, Self::Error> {
        match raw {
            RawTaskKillLimit::Count(n) => Ok(TaskKillLimit::Bounded(n)),
            RawTaskKillLimit::Text(s) if s == "inf" => Ok(TaskKillLimit::Unbounded),
            RawTaskKillLimit::Text(s) => s
                .parse()
                .map(TaskKillLimit::Bounded)
                .map_err(|_| format!("max_tasks_to_kill must be an integer or \"inf\", got {s:?}")),
        }
    }
}

impl From<TaskKillLimit> for RawTaskKillLimit {
    fn from(limit: TaskKillLimit) -> Self {
        match limit {
            TaskKillLimit::Bounded(n) => RawTaskKillLimit::Count(n),
            TaskKillLimit::Unbounded => RawTaskKillLimit::Text("inf".to_string()),
        }
    }
}

/// Per-pool bounds on capacity and on how fast it may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingLimits {
    pub min_capacity: f64,
    pub max_capacity: f64,
    #[serde(default)]
    pub max_tasks_to_kill: TaskKillLimit,
    pub max_weight_to_add: f64,
    pub max_weight_to_remove: f64,
}

impl ScalingLimits {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_capacity < 0.0 || self.min_capacity > self.max_capacity {
            return Err(ConfigError::Invalid(format!(
                "scaling_limits: need 0 <= min_capacity <= max_capacity, got {} and {}",
                self.min_capacity, self.max_capacity
            )));
        }
        if self.max_weight_to_add < 0.0 || self.max_weight_to_remove < 0.0 {
            return Err(ConfigError::Invalid(
                "scaling_limits: max_weight_to_add and max_weight_to_remove must be non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ── Autoscaling ────────────────────────────────────────────────────

/// Fully resolved control-policy parameters for one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    pub excluded_resources: Vec<String>,
    pub setpoint: f64,
    pub target_capacity_margin: f64,
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        Self {
            excluded_resources: Vec::new(),
            setpoint: DEFAULT_SETPOINT,
            target_capacity_margin: DEFAULT_TARGET_CAPACITY_MARGIN,
        }
    }
}

impl AutoscalingConfig {
    /// Resolve each field from the pool, then the defaults, then built-ins.
    pub fn resolve(
        pool: Option<&AutoscalingOverrides>,
        defaults: Option<&AutoscalingOverrides>,
    ) -> ConfigResult<Self> {
        let builtin = Self::default();
        let pick = |f: fn(&AutoscalingOverrides) -> Option<f64>| {
            pool.and_then(f).or_else(|| defaults.and_then(f))
        };
        let config = Self {
            excluded_resources: pool
                .and_then(|p| p.excluded_resources.clone())
                .or_else(|| defaults.and_then(|d| d.excluded_resources.clone()))
                .unwrap_or(builtin.excluded_resources),
            setpoint: pick(|o| o.setpoint).unwrap_or(builtin.setpoint),
            target_capacity_margin: pick(|o| o.target_capacity_margin)
                .unwrap_or(builtin.target_capacity_margin),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.setpoint > 0.0 && self.setpoint <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "autoscaling.setpoint must be in (0, 1], got {}",
                self.setpoint
            )));
        }
        if self.target_capacity_margin < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "autoscaling.target_capacity_margin must be >= 0, got {}",
                self.target_capacity_margin
            )));
        }
        if let Some(bad) = self
            .excluded_resources
            .iter()
            .find(|r| !is_known_resource(r))
        {
            return Err(ConfigError::Invalid(format!(
                "autoscaling.excluded_resources: unknown resource {bad:?}"
            )));
        }
        Ok(())
    }

    pub fn is_excluded(&self, resource: &str) -> bool {
        self.excluded_resources.iter().any(|r| r == resource)
    }
}

/// Partially specified autoscaling section as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingOverrides {
    pub excluded_resources: Option<Vec<String>>,
    pub setpoint: Option<f64>,
    pub target_capacity_margin: Option<f64>,
}

// ── Signal ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    pub period_minutes: i64,
    /// Single-key tables, flattened by [`SignalConfig::parameters_for`].
    #[serde(default)]
    pub parameters: Vec<toml::Table>,
}

impl SignalConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.period_minutes <= 0 {
            return Err(ConfigError::Invalid(format!(
                "length of signal period must be positive, got {}",
                self.period_minutes
            )));
        }
        Ok(())
    }

    /// Flattened parameters; `cluster` and `pool` always win.
    pub fn parameters_for(&self, cluster: &str, pool: &str) -> toml::Table {
        let mut params: toml::Table = self
            .parameters
            .iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect();
        params.insert("cluster".to_string(), toml::Value::String(cluster.to_string()));
        params.insert("pool".to_string(), toml::Value::String(pool.to_string()));
        params
    }
}

// ── Files ──────────────────────────────────────────────────────────

/// Cluster-wide defaults that pool files fall back to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub autoscaling: Option<AutoscalingOverrides>,
    /// The default signal, used when a pool's own signal fails.
    pub autoscale_signal: Option<SignalConfig>,
}

impl DefaultsConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_toml_str(&read_file(path)?)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// One pool's configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub draining_enabled: bool,
    pub scaling_limits: ScalingLimits,
    pub autoscaling: Option<AutoscalingOverrides>,
    pub autoscale_signal: Option<SignalConfig>,
    /// Entries of the form `{ <kind> = { ... } }`, interpreted by the
    /// resource-group registry. Kept raw so that one malformed entry does
    /// not reject the whole file.
    #[serde(default)]
    pub resource_groups: Vec<toml::Value>,
}

impl PoolConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_toml_str(&read_file(path)?)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PoolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.scaling_limits.validate()?;
        if let Some(signal) = &self.autoscale_signal {
            signal.validate()?;
        }
        Ok(())
    }

    /// Resolve this pool's autoscaling parameters against `defaults`.
    pub fn autoscaling_config(
        &self,
        defaults: Option<&DefaultsConfig>,
    ) -> ConfigResult<AutoscalingConfig> {
        AutoscalingConfig::resolve(
            self.autoscaling.as_ref(),
            defaults.and_then(|d| d.autoscaling.as_ref()),
        )
    }
}
