//! Human-readable pool status report.

use poolscale_core::{AgentState, ClusterNodeMetadata, ClusterResources, PoolKey};

use crate::error::PoolResult;
use crate::manager::PoolManager;

#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub id: String,
    pub status: String,
    pub is_stale: bool,
    pub target_capacity: f64,
    pub fulfilled_capacity: f64,
    /// Populated only for verbose reports.
    pub nodes: Vec<ClusterNodeMetadata>,
}

/// Which nodes to show in a verbose report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFilter {
    pub only_idle: bool,
    pub only_orphans: bool,
}

impl StatusFilter {
    fn admits(&self, node: &ClusterNodeMetadata) -> bool {
        (!self.only_idle || node.agent.state == AgentState::Idle)
            && (!self.only_orphans || node.agent.state == AgentState::Orphaned)
    }
}

/// Snapshot of a pool's capacity, resource groups and (optionally) nodes.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub key: PoolKey,
    pub groups: Vec<GroupStatus>,
    /// `None` when every group is stale.
    pub target_capacity: Option<f64>,
    pub fulfilled_capacity: f64,
    pub non_orphan_fulfilled_capacity: f64,
    pub total_resources: ClusterResources,
    pub allocated_resources: ClusterResources,
}

impl PoolStatus {
    pub fn collect(manager: &PoolManager, verbose: bool) -> PoolResult<Self> {
        let mut nodes = if verbose {
            manager.get_node_metadatas(None)?
        } else {
            Vec::new()
        };

        let groups = manager
            .resource_groups()
            .iter()
            .map(|(id, group)| {
                let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut nodes)
                    .into_iter()
                    .partition(|n| &n.instance.group_id == id);
                nodes = rest;
                GroupStatus {
                    id: id.clone(),
                    status: group.status(),
                    is_stale: group.is_stale(),
                    target_capacity: group.target_capacity(),
                    fulfilled_capacity: group.fulfilled_capacity(),
                    nodes: mine,
                }
            })
            .collect();

        let connector = manager.connector();
        Ok(Self {
            key: manager.key().clone(),
            groups,
            target_capacity: manager.target_capacity().ok(),
            fulfilled_capacity: manager.fulfilled_capacity(),
            non_orphan_fulfilled_capacity: manager.non_orphan_fulfilled_capacity(),
            total_resources: connector.get_cluster_total_resources(),
            allocated_resources: connector.get_cluster_allocated_resources(),
        })
    }

    pub fn render(&self, filter: StatusFilter) -> String {
        let mut out = format!(
            "Current status for the {}.{} pool in the {} cluster:\n\n",
            self.key.pool, self.key.scheduler, self.key.cluster
        );

        out.push_str("Resource groups (fulfilled / target capacity):\n");
        for group in &self.groups {
            let stale = if group.is_stale { ", stale" } else { "" };
            out.push_str(&format!(
                "\t{}: {}{} ({} / {})\n",
                group.id, group.status, stale, group.fulfilled_capacity, group.target_capacity
            ));
            for node in group.nodes.iter().filter(|n| filter.admits(n)) {
                let instance = &node.instance;
                out.push_str(&format!(
                    "\t  - {} {} ({}): {}, {} tasks, {} batch tasks, up {}s{}\n",
                    instance.instance_id,
                    instance.market,
                    instance.ip_address.as_deref().unwrap_or("unknown"),
                    node.agent.state,
                    node.agent.task_count,
                    node.agent.batch_task_count,
                    instance.uptime_secs,
                    if instance.is_stale { ", stale" } else { "" },
                ));
            }
        }
        out.push('\n');

        match self.target_capacity {
            Some(t) => out.push_str(&format!("Total target capacity: {t}\n")),
            None => out.push_str("Total target capacity: unknown (all resource groups are stale)\n"),
        }
        out.push_str(&format!("Total fulfilled capacity: {}\n", self.fulfilled_capacity));
        out.push_str(&format!(
            "Non-orphan fulfilled capacity: {}\n\n",
            self.non_orphan_fulfilled_capacity
        ));

        out.push_str("Resource allocation:\n");
        for (resource, total) in self.total_resources.iter() {
            let allocated = self.allocated_resources.get(resource).unwrap_or(0.0);
            let percent = if total == 0.0 { 0.0 } else { allocated / total * 100.0 };
            out.push_str(&format!(
                "\t{resource}: {allocated} / {total} ({percent:.2}%)\n"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use std::collections::HashMap;

    fn status_fixture() -> Fixture {
        let mut groups = standard_groups();
        groups[1].instances = vec![
            instance("sfr-1", "i-1", "10.0.0.1", 1.0),
            instance("sfr-1", "i-2", "10.0.0.2", 1.0),
        ];
        let agents: HashMap<String, _> = [
            ("10.0.0.1".to_string(), agent(AgentState::Idle, 0, 0)),
            ("10.0.0.2".to_string(), agent(AgentState::Orphaned, 0, 0)),
        ]
        .into_iter()
        .collect();
        let fx = fixture_with(groups, agents, |_| {});
        {
            let mut c = fx.connector.lock().unwrap();
            c.totals = ClusterResources::from_fn(|r| if r == "cpus" { 10.0 } else { 0.0 });
            c.allocated = ClusterResources::from_fn(|r| if r == "cpus" { 5.0 } else { 0.0 });
        }
        fx
    }

    #[test]
    fn summary_lines() {
        let fx = status_fixture();
        let status = PoolStatus::collect(&fx.manager, false).unwrap();
        assert_eq!(status.groups.len(), 7);
        assert!(status.groups.iter().all(|g| g.nodes.is_empty()));

        let text = status.render(StatusFilter::default());
        assert!(text.contains("bar.mesos pool in the mesos-test cluster"));
        assert!(text.contains("\tsfr-1: active (6 / 3)\n"));
        assert!(text.contains("Total target capacity: 49\n"));
        assert!(text.contains("Total fulfilled capacity: 126\n"));
        assert!(text.contains("Non-orphan fulfilled capacity: 1\n"));
        assert!(text.contains("\tcpus: 5 / 10 (50.00%)\n"));
        assert!(!text.contains("i-1"));
    }

    #[test]
    fn verbose_filters_nodes() {
        let fx = status_fixture();
        let status = PoolStatus::collect(&fx.manager, true).unwrap();
        assert_eq!(status.groups[1].nodes.len(), 2);

        let all = status.render(StatusFilter::default());
        assert!(all.contains("i-1") && all.contains("i-2"));

        let idle = status.render(StatusFilter {
            only_idle: true,
            ..Default::default()
        });
        assert!(idle.contains("i-1 <market-1, None> (10.0.0.1): idle"));
        assert!(!idle.contains("i-2"));

        let orphans = status.render(StatusFilter {
            only_orphans: true,
            ..Default::default()
        });
        assert!(orphans.contains("i-2"));
        assert!(!orphans.contains("i-1 "));
    }

    #[test]
    fn all_stale_target_is_unknown() {
        let mut groups = standard_groups();
        for g in &mut groups {
            g.is_stale = true;
        }
        let fx = fixture(groups);
        let status = PoolStatus::collect(&fx.manager, false).unwrap();
        assert!(status.target_capacity.is_none());
        assert!(status.render(StatusFilter::default()).contains("unknown"));
    }
}
