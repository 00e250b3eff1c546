//! Shared types used across poolscale crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource names understood by the autoscaler, in reporting order.
pub const RESOURCE_NAMES: [&str; 4] = ["cpus", "mem", "disk", "gpus"];

/// Returns true if `name` is one of [`RESOURCE_NAMES`].
pub fn is_known_resource(name: &str) -> bool {
    RESOURCE_NAMES.contains(&name)
}

// ── Resource request ───────────────────────────────────────────────

/// Resources requested by a signal for "now".
///
/// `None` means the signal has no opinion about that resource; `Some(0.0)`
/// asks for that resource to be scaled to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    pub cpus: Option<f64>,
    pub mem: Option<f64>,
    pub disk: Option<f64>,
    pub gpus: Option<f64>,
}

impl ResourceRequest {
    /// Look up a request by resource name. Unknown names have no opinion.
    pub fn get(&self, resource: &str) -> Option<f64> {
        match resource {
            "cpus" => self.cpus,
            "mem" => self.mem,
            "disk" => self.disk,
            "gpus" => self.gpus,
            _ => None,
        }
    }

    /// Iterate `(name, value)` pairs in [`RESOURCE_NAMES`] order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<f64>)> + '_ {
        RESOURCE_NAMES.iter().map(move |r| (*r, self.get(r)))
    }

    /// True when no resource carries a value.
    pub fn has_no_opinion(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }

    /// True when every present value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none_or(|v| v == 0.0))
    }
}

// ── Cluster resources ──────────────────────────────────────────────

/// Fixed-shape record of quantities for each resource name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterResources {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub gpus: f64,
}

impl ClusterResources {
    /// Build a record by evaluating `f` for each resource name.
    pub fn from_fn(mut f: impl FnMut(&'static str) -> f64) -> Self {
        Self {
            cpus: f("cpus"),
            mem: f("mem"),
            disk: f("disk"),
            gpus: f("gpus"),
        }
    }

    /// Like [`from_fn`](Self::from_fn), stopping at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(&'static str) -> Result<f64, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            cpus: f("cpus")?,
            mem: f("mem")?,
            disk: f("disk")?,
            gpus: f("gpus")?,
        })
    }

    /// Quantity for `resource`, or `None` for an unknown name.
    pub fn get(&self, resource: &str) -> Option<f64> {
        match resource {
            "cpus" => Some(self.cpus),
            "mem" => Some(self.mem),
            "disk" => Some(self.disk),
            "gpus" => Some(self.gpus),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        RESOURCE_NAMES
            .iter()
            .map(move |r| (*r, self.get(r).unwrap_or_default()))
    }
}

// ── Agents ─────────────────────────────────────────────────────────

/// Scheduler-level state of the agent running on an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Running,
    /// The instance is up but the scheduler does not know about it.
    Orphaned,
    #[default]
    Unknown,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Orphaned => "orphaned",
            AgentState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the cluster connector knows about one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_id: String,
    pub allocated_resources: ClusterResources,
    pub batch_task_count: u64,
    pub is_safe_to_kill: bool,
    pub state: AgentState,
    pub task_count: u64,
    pub total_resources: ClusterResources,
}

impl Default for AgentMetadata {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            allocated_resources: ClusterResources::default(),
            batch_task_count: 0,
            is_safe_to_kill: true,
            state: AgentState::Unknown,
            task_count: 0,
            total_resources: ClusterResources::default(),
        }
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// An (instance type, availability zone) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceMarket {
    pub instance_type: String,
    pub az: Option<String>,
}

impl InstanceMarket {
    pub fn new(instance_type: impl Into<String>, az: Option<&str>) -> Self {
        Self {
            instance_type: instance_type.into(),
            az: az.map(str::to_string),
        }
    }
}

impl fmt::Display for InstanceMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}>",
            self.instance_type,
            self.az.as_deref().unwrap_or("None")
        )
    }
}

impl FromStr for InstanceMarket {
    type Err = String;

    /// Parse the `<type, az>` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(|| format!("malformed market: {s}"))?;
        let (instance_type, az) = inner
            .split_once(", ")
            .ok_or_else(|| format!("malformed market: {s}"))?;
        let az = (az != "None").then_some(az);
        Ok(Self::new(instance_type, az))
    }
}

/// Cloud-level view of one instance in a resource group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub group_id: String,
    pub hostname: Option<String>,
    pub instance_id: String,
    pub ip_address: Option<String>,
    pub is_stale: bool,
    pub market: InstanceMarket,
    /// Cloud lifecycle state, e.g. `running` or `pending`.
    pub state: String,
    pub uptime_secs: u64,
    pub weight: f64,
}

/// Agent and instance metadata joined by IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNodeMetadata {
    pub agent: AgentMetadata,
    pub instance: InstanceMetadata,
}

// ── Keys ───────────────────────────────────────────────────────────

/// Identifies one autoscaled pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub cluster: String,
    pub pool: String,
    pub scheduler: String,
}

impl PoolKey {
    pub fn new(cluster: &str, pool: &str, scheduler: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            pool: pool.to_string(),
            scheduler: scheduler.to_string(),
        }
    }

    /// Key used for pause flags: `{cluster}.{pool}.{scheduler}`.
    pub fn pause_key(&self) -> String {
        format!("{}.{}.{}", self.cluster, self.pool, self.scheduler)
    }

    /// Dimension string used for metadata history:
    /// `cluster={cluster},pool={pool}.{scheduler}`.
    pub fn dimensions(&self) -> String {
        format!(
            "cluster={},pool={}.{}",
            self.cluster, self.pool, self.scheduler
        )
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.cluster, self.pool, self.scheduler)
    }
}
