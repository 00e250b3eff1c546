//! Fakes shared by this crate's tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use poolscale_core::{
    AgentMetadata, AgentState, ClusterResources, InstanceMarket, InstanceMetadata, PoolConfig,
    PoolKey, ResourceRequest, ScalingLimits, TaskKillLimit,
};
use poolscale_metrics::MetricsRegistry;
use poolscale_pool::{
    ClusterConnector, PoolManager, ResourceGroup, ResourceGroupError, ResourceGroupMap,
    ResourceGroupRegistry,
};

use crate::error::SignalError;
use crate::signal::Signal;

pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

pub(crate) fn pool_key() -> PoolKey {
    PoolKey::new("mesos-test", "bar", "mesos")
}

// ── Signals ────────────────────────────────────────────────────────

/// Replays scripted responses in order, then fails.
pub(crate) struct ScriptedSignal {
    name: String,
    responses: VecDeque<Result<ResourceRequest, SignalError>>,
    pub evaluations: Vec<u64>,
    pub reconnects: usize,
}

impl ScriptedSignal {
    pub fn new(name: &str, responses: Vec<Result<ResourceRequest, SignalError>>) -> Self {
        Self {
            name: name.to_string(),
            responses: responses.into(),
            evaluations: Vec::new(),
            reconnects: 0,
        }
    }

    pub fn boxed(name: &str, responses: Vec<Result<ResourceRequest, SignalError>>) -> Box<dyn Signal> {
        Box::new(Self::new(name, responses))
    }
}

impl Signal for ScriptedSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn period_minutes(&self) -> u64 {
        10
    }

    fn evaluate(&mut self, timestamp: u64) -> Result<ResourceRequest, SignalError> {
        self.evaluations.push(timestamp);
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(SignalError::Evaluation("no scripted response".into())))
    }

    fn reconnect(&mut self) -> Result<(), SignalError> {
        self.reconnects += 1;
        Ok(())
    }
}

pub(crate) fn cpus(value: f64) -> ResourceRequest {
    ResourceRequest {
        cpus: Some(value),
        ..Default::default()
    }
}

// ── Pool ───────────────────────────────────────────────────────────

/// A resource group with one running instance carrying all of its
/// non-orphan capacity.
#[derive(Debug, Clone)]
pub(crate) struct GroupState {
    pub id: String,
    pub target_capacity: f64,
    pub fulfilled_capacity: f64,
    pub instance_weight: f64,
    pub is_stale: bool,
    pub modified: Vec<(f64, bool)>,
}

pub(crate) fn group(id: &str, target: f64, fulfilled: f64, instance_weight: f64) -> GroupState {
    GroupState {
        id: id.to_string(),
        target_capacity: target,
        fulfilled_capacity: fulfilled,
        instance_weight,
        is_stale: false,
        modified: Vec::new(),
    }
}

type SharedGroup = Arc<Mutex<GroupState>>;

struct FakeGroup {
    id: String,
    state: SharedGroup,
}

impl FakeGroup {
    fn state(&self) -> std::sync::MutexGuard<'_, GroupState> {
        self.state.lock().unwrap()
    }
}

impl ResourceGroup for FakeGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "fake"
    }

    fn status(&self) -> String {
        "active".to_string()
    }

    fn target_capacity(&self) -> f64 {
        self.state().target_capacity
    }

    fn fulfilled_capacity(&self) -> f64 {
        self.state().fulfilled_capacity
    }

    fn min_capacity(&self) -> f64 {
        0.0
    }

    fn max_capacity(&self) -> f64 {
        f64::INFINITY
    }

    fn is_stale(&self) -> bool {
        self.state().is_stale
    }

    fn instance_ids(&self) -> Vec<String> {
        vec![format!("{}-i", self.id)]
    }

    fn market_weight(&self, _market: &InstanceMarket) -> f64 {
        1.0
    }

    fn market_capacities(&self) -> BTreeMap<InstanceMarket, f64> {
        BTreeMap::new()
    }

    fn get_instance_metadatas(
        &self,
        _state_filter: Option<&[&str]>,
    ) -> Result<Vec<InstanceMetadata>, ResourceGroupError> {
        let state = self.state();
        if state.instance_weight == 0.0 {
            return Ok(Vec::new());
        }
        Ok(vec![InstanceMetadata {
            group_id: state.id.clone(),
            hostname: None,
            instance_id: format!("{}-i", state.id),
            ip_address: Some("10.0.0.1".to_string()),
            is_stale: state.is_stale,
            market: InstanceMarket::new("m5.large", Some("us-west-2a")),
            state: "running".to_string(),
            uptime_secs: 60,
            weight: state.instance_weight,
        }])
    }

    fn modify_target_capacity(
        &mut self,
        target_capacity: f64,
        dry_run: bool,
    ) -> Result<(), ResourceGroupError> {
        let mut state = self.state();
        state.modified.push((target_capacity, dry_run));
        if !dry_run {
            state.target_capacity = target_capacity;
        }
        Ok(())
    }

    fn terminate_instances_by_id(
        &mut self,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ResourceGroupError> {
        Ok(instance_ids.to_vec())
    }
}

struct FakeConnector {
    totals: ClusterResources,
}

impl ClusterConnector for FakeConnector {
    fn reload_state(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn get_resource_total(&self, resource: &str) -> f64 {
        self.totals.get(resource).unwrap_or(0.0)
    }

    fn get_resource_allocation(&self, _resource: &str) -> f64 {
        0.0
    }

    fn agent_metadata_for_ip(&self, _ip_address: &str) -> AgentMetadata {
        AgentMetadata {
            agent_id: "agent".to_string(),
            state: AgentState::Running,
            ..Default::default()
        }
    }
}

/// Totals of `amount` for cpus, mem and disk, and no gpus.
pub(crate) fn totals(amount: f64) -> ClusterResources {
    ClusterResources {
        cpus: amount,
        mem: amount,
        disk: amount,
        gpus: 0.0,
    }
}

/// Shared views of the fake groups, still readable after the manager
/// has moved into an autoscaler.
pub(crate) struct GroupHandles(HashMap<String, SharedGroup>);

impl GroupHandles {
    pub fn group(&self, id: &str) -> GroupState {
        self.0[id].lock().unwrap().clone()
    }
}

pub(crate) struct TestPool {
    pub manager: PoolManager,
    pub groups: GroupHandles,
}

/// A reloaded manager over `groups` with generous scaling limits.
pub(crate) fn pool(groups: Vec<GroupState>, totals: ClusterResources) -> TestPool {
    let shared: HashMap<String, SharedGroup> = groups
        .into_iter()
        .map(|g| (g.id.clone(), Arc::new(Mutex::new(g))))
        .collect();
    let mut ids: Vec<&String> = shared.keys().collect();
    ids.sort();

    let config = PoolConfig {
        draining_enabled: false,
        scaling_limits: ScalingLimits {
            min_capacity: 0.0,
            max_capacity: 1000.0,
            max_tasks_to_kill: TaskKillLimit::Bounded(0),
            max_weight_to_add: 1000.0,
            max_weight_to_remove: 1000.0,
        },
        autoscaling: None,
        autoscale_signal: None,
        resource_groups: ids
            .iter()
            .map(|id| {
                toml::Value::Table(toml::from_str(&format!("fake = {{ id = \"{id}\" }}")).unwrap())
            })
            .collect(),
    };

    let loader_groups = shared.clone();
    let registry = ResourceGroupRegistry::new().register("fake", move |_, _, config| {
        let id = config
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ResourceGroupError::Config("missing id".into()))?;
        let state = loader_groups
            .get(id)
            .ok_or_else(|| ResourceGroupError::Config(format!("no fake group {id}")))?;
        let mut map = ResourceGroupMap::new();
        map.insert(
            id.to_string(),
            Box::new(FakeGroup {
                id: id.to_string(),
                state: state.clone(),
            }) as Box<dyn ResourceGroup>,
        );
        Ok(map)
    });

    let mut manager = PoolManager::new(
        pool_key(),
        config,
        Box::new(FakeConnector { totals }),
        None,
        registry,
        MetricsRegistry::new(),
    )
    .unwrap();
    manager.reload_state().unwrap();
    TestPool {
        manager,
        groups: GroupHandles(shared),
    }
}
