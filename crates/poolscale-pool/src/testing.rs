//! In-memory fakes of the external interfaces, shared by this crate's tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use poolscale_core::{
    AgentMetadata, AgentState, ClusterNodeMetadata, ClusterResources, InstanceMarket,
    InstanceMetadata, PoolConfig, PoolKey, ScalingLimits, TaskKillLimit,
};
use poolscale_metrics::MetricsRegistry;

use crate::connector::ClusterConnector;
use crate::draining::DrainingClient;
use crate::error::ResourceGroupError;
use crate::manager::PoolManager;
use crate::resource_group::{ResourceGroup, ResourceGroupMap, ResourceGroupRegistry};

// ── Resource groups ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct FakeGroupState {
    pub id: String,
    pub target_capacity: f64,
    pub fulfilled_capacity: f64,
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub is_stale: bool,
    pub market_capacities: BTreeMap<InstanceMarket, f64>,
    pub instances: Vec<InstanceMetadata>,
    pub fail_modify: bool,
    pub modified: Vec<(f64, bool)>,
    pub terminated: Vec<Vec<String>>,
}

impl FakeGroupState {
    pub fn new(id: &str, target: f64, fulfilled: f64) -> Self {
        Self {
            id: id.to_string(),
            target_capacity: target,
            fulfilled_capacity: fulfilled,
            min_capacity: 0.0,
            max_capacity: f64::INFINITY,
            is_stale: false,
            market_capacities: BTreeMap::new(),
            instances: Vec::new(),
            fail_modify: false,
            modified: Vec::new(),
            terminated: Vec::new(),
        }
    }
}

pub(crate) type SharedGroup = Arc<Mutex<FakeGroupState>>;

pub(crate) struct FakeGroup {
    id: String,
    state: SharedGroup,
}

impl FakeGroup {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeGroupState> {
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
        self.state().min_capacity
    }

    fn max_capacity(&self) -> f64 {
        self.state().max_capacity
    }

    fn is_stale(&self) -> bool {
        self.state().is_stale
    }

    fn instance_ids(&self) -> Vec<String> {
        self.state()
            .instances
            .iter()
            .map(|i| i.instance_id.clone())
            .collect()
    }

    fn market_weight(&self, _market: &InstanceMarket) -> f64 {
        1.0
    }

    fn market_capacities(&self) -> BTreeMap<InstanceMarket, f64> {
        self.state().market_capacities.clone()
    }

    fn get_instance_metadatas(
        &self,
        state_filter: Option<&[&str]>,
    ) -> Result<Vec<InstanceMetadata>, ResourceGroupError> {
        Ok(self
            .state()
            .instances
            .iter()
            .filter(|i| state_filter.is_none_or(|f| f.contains(&i.state.as_str())))
            .cloned()
            .collect())
    }

    fn modify_target_capacity(
        &mut self,
        target_capacity: f64,
        dry_run: bool,
    ) -> Result<(), ResourceGroupError> {
        let mut state = self.state();
        state.modified.push((target_capacity, dry_run));
        if state.fail_modify {
            return Err(ResourceGroupError::Failed {
                group_id: self.id.clone(),
                message: "request limit exceeded".to_string(),
            });
        }
        Ok(())
    }

    fn terminate_instances_by_id(
        &mut self,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ResourceGroupError> {
        self.state().terminated.push(instance_ids.to_vec());
        Ok(instance_ids.to_vec())
    }
}

/// Loader for `{ fake = { id = "..." } }` entries backed by `states`.
pub(crate) fn fake_loader(
    states: &[FakeGroupState],
) -> impl Fn(&str, &str, &toml::Value) -> Result<ResourceGroupMap, ResourceGroupError> + Send + Sync + 'static
{
    let shared: HashMap<String, SharedGroup> = states
        .iter()
        .map(|s| (s.id.clone(), Arc::new(Mutex::new(s.clone()))))
        .collect();
    shared_loader(shared)
}

fn shared_loader(
    shared: HashMap<String, SharedGroup>,
) -> impl Fn(&str, &str, &toml::Value) -> Result<ResourceGroupMap, ResourceGroupError> + Send + Sync + 'static
{
    move |_cluster, _pool, config| {
        let id = config
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ResourceGroupError::Config("missing id".to_string()))?;
        let state = shared
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
    }
}

// ── Connector ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct FakeConnectorState {
    pub agents: HashMap<String, AgentMetadata>,
    pub totals: ClusterResources,
    pub allocated: ClusterResources,
    pub reloads: usize,
}

pub(crate) type SharedConnector = Arc<Mutex<FakeConnectorState>>;

pub(crate) struct FakeConnector(pub SharedConnector);

impl ClusterConnector for FakeConnector {
    fn reload_state(&mut self) -> anyhow::Result<()> {
        self.0.lock().unwrap().reloads += 1;
        Ok(())
    }

    fn get_resource_total(&self, resource: &str) -> f64 {
        self.0.lock().unwrap().totals.get(resource).unwrap_or(0.0)
    }

    fn get_resource_allocation(&self, resource: &str) -> f64 {
        self.0.lock().unwrap().allocated.get(resource).unwrap_or(0.0)
    }

    fn agent_metadata_for_ip(&self, ip_address: &str) -> AgentMetadata {
        self.0
            .lock()
            .unwrap()
            .agents
            .get(ip_address)
            .cloned()
            .unwrap_or_default()
    }
}

// ── Draining ───────────────────────────────────────────────────────

pub(crate) type Submissions = Arc<Mutex<Vec<(String, String, String)>>>;

pub(crate) struct FakeDrainingClient(pub Submissions);

impl DrainingClient for FakeDrainingClient {
    fn submit_instance_for_draining(
        &self,
        instance: &InstanceMetadata,
        sender: &str,
        scheduler: &str,
    ) -> anyhow::Result<()> {
        self.0.lock().unwrap().push((
            instance.instance_id.clone(),
            sender.to_string(),
            scheduler.to_string(),
        ));
        Ok(())
    }
}

// ── Builders ───────────────────────────────────────────────────────

pub(crate) fn limits() -> ScalingLimits {
    ScalingLimits {
        min_capacity: 3.0,
        max_capacity: 345.0,
        max_tasks_to_kill: TaskKillLimit::Bounded(0),
        max_weight_to_add: 200.0,
        max_weight_to_remove: 10.0,
    }
}

/// Seven groups `sfr-0..6` with target `2i + 1` (total 49), fulfilled
/// `6i` (total 126), and per-market capacities `i`, `2i`, `3i`.
pub(crate) fn standard_groups() -> Vec<FakeGroupState> {
    (0..7)
        .map(|i| {
            let mut state = FakeGroupState::new(&format!("sfr-{i}"), (2 * i + 1) as f64, (6 * i) as f64);
            for (m, mult) in [("market-1", 1), ("market-2", 2), ("market-3", 3)] {
                state
                    .market_capacities
                    .insert(InstanceMarket::new(m, None), (i * mult) as f64);
            }
            state
        })
        .collect()
}

pub(crate) fn instance(group_id: &str, instance_id: &str, ip: &str, weight: f64) -> InstanceMetadata {
    InstanceMetadata {
        group_id: group_id.to_string(),
        hostname: Some("host1".to_string()),
        instance_id: instance_id.to_string(),
        ip_address: Some(ip.to_string()),
        is_stale: false,
        market: InstanceMarket::new("market-1", None),
        state: "running".to_string(),
        uptime_secs: 1000,
        weight,
    }
}

pub(crate) fn agent(state: AgentState, tasks: u64, batch_tasks: u64) -> AgentMetadata {
    AgentMetadata {
        agent_id: "foo".to_string(),
        batch_task_count: batch_tasks,
        state,
        task_count: tasks,
        ..Default::default()
    }
}

/// Node metadata with the defaults used throughout the pruning tests:
/// a running agent with five tasks and weight 1.
pub(crate) fn node(group_id: &str, instance_id: &str) -> ClusterNodeMetadata {
    ClusterNodeMetadata {
        agent: agent(AgentState::Running, 5, 0),
        instance: instance(group_id, instance_id, "1.2.3.4", 1.0),
    }
}

pub(crate) struct Fixture {
    pub manager: PoolManager,
    pub groups: BTreeMap<String, SharedGroup>,
    pub connector: SharedConnector,
    pub metrics: MetricsRegistry,
    pub submissions: Submissions,
}

impl Fixture {
    pub fn group(&self, id: &str) -> std::sync::MutexGuard<'_, FakeGroupState> {
        self.groups[id].lock().unwrap()
    }
}

pub(crate) fn pool_config(group_ids: &[&str], limits: ScalingLimits) -> PoolConfig {
    PoolConfig {
        draining_enabled: false,
        scaling_limits: limits,
        autoscaling: None,
        autoscale_signal: None,
        resource_groups: group_ids
            .iter()
            .map(|id| toml::Value::Table(toml::from_str(&format!("fake = {{ id = \"{id}\" }}")).unwrap()))
            .collect(),
    }
}

/// A reloaded manager over `groups`, with agents keyed by IP.
pub(crate) fn fixture_with(
    groups: Vec<FakeGroupState>,
    agents: HashMap<String, AgentMetadata>,
    config_fn: impl FnOnce(&mut PoolConfig),
) -> Fixture {
    let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    let mut config = pool_config(&ids, limits());
    config_fn(&mut config);

    let shared: BTreeMap<String, SharedGroup> = groups
        .iter()
        .map(|s| (s.id.clone(), Arc::new(Mutex::new(s.clone()))))
        .collect();
    let registry = ResourceGroupRegistry::new()
        .register("fake", shared_loader(shared.clone().into_iter().collect()));

    let connector: SharedConnector = Arc::new(Mutex::new(FakeConnectorState {
        agents,
        ..Default::default()
    }));
    let submissions: Submissions = Arc::default();
    let metrics = MetricsRegistry::new();
    let draining: Option<Box<dyn DrainingClient>> = config
        .draining_enabled
        .then(|| Box::new(FakeDrainingClient(submissions.clone())) as Box<dyn DrainingClient>);

    let mut manager = PoolManager::new(
        PoolKey::new("mesos-test", "bar", "mesos"),
        config,
        Box::new(FakeConnector(connector.clone())),
        draining,
        registry,
        metrics.clone(),
    )
    .unwrap();
    manager.reload_state().unwrap();

    Fixture {
        manager,
        groups: shared,
        connector,
        metrics,
        submissions,
    }
}

pub(crate) fn fixture(groups: Vec<FakeGroupState>) -> Fixture {
    fixture_with(groups, HashMap::new(), |_| {})
}
