//! Pool observability: a status summary in the spirit of the original
//! `clusterman status` CLI, but expressed purely as a reusable
//! `Display`-able value so `clustermand status` (and tests) can both
//! consume it without re-running discovery.

use std::fmt;

use clusterman_resource_groups::ResourceGroup;

use crate::cluster::ClusterManagerClient;

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceClass {
    /// Registered with the cluster manager and running workloads.
    Running,
    /// Registered with the cluster manager but idle (§4.2.2).
    Idle,
    /// Not registered with the cluster manager at all.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub id: String,
    pub target_capacity: u64,
    pub fulfilled_capacity: u64,
    pub instance_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolSummary {
    pub cluster: String,
    pub pool: String,
    pub target_capacity: u64,
    pub fulfilled_capacity: u64,
    pub groups: Vec<GroupSummary>,
    pub instances: Vec<(String, InstanceClass)>,
}

pub fn summarize(cluster: &str, pool: &str, groups: &[Box<dyn ResourceGroup>], cluster_client: &dyn ClusterManagerClient) -> PoolSummary {
    let known: std::collections::HashMap<String, f64> = cluster_client.list_agents().into_iter().map(|a| (a.instance_id, a.allocated_cpu)).collect();

    let mut group_summaries = Vec::with_capacity(groups.len());
    let mut instances = Vec::new();
    for group in groups {
        group_summaries.push(GroupSummary {
            id: group.id().to_string(),
            target_capacity: group.target_capacity(),
            fulfilled_capacity: group.fulfilled_capacity(),
            instance_count: group.instance_ids().len(),
        });
        for id in group.instance_ids() {
            let class = match known.get(&id) {
                Some(cpu) if *cpu > 0.0 => InstanceClass::Running,
                Some(_) => InstanceClass::Idle,
                None => InstanceClass::Orphaned,
            };
            instances.push((id, class));
        }
    }

    PoolSummary {
        cluster: cluster.to_string(),
        pool: pool.to_string(),
        target_capacity: groups.iter().map(|g| g.target_capacity()).sum(),
        fulfilled_capacity: groups.iter().map(|g| g.fulfilled_capacity()).sum(),
        groups: group_summaries,
        instances,
    }
}

impl fmt::Display for PoolSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}/{}: target={} fulfilled={}", self.cluster, self.pool, self.target_capacity, self.fulfilled_capacity)?;
        for group in &self.groups {
            writeln!(f, "  {} target={} fulfilled={} instances={}", group.id, group.target_capacity, group.fulfilled_capacity, group.instance_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{AgentInfo, StaticClusterManagerClient};
    use clusterman_core::Market;
    use clusterman_resource_groups::{testutil::FakeResourceGroup, GroupKind};

    #[test]
    fn classifies_instances_by_cluster_manager_knowledge() {
        let m = Market::new("m5.xlarge", "us-west-2a");
        let group = FakeResourceGroup::new("grp-1", GroupKind::AutoScaling)
            .with_target(3)
            .with_instances_in_market(vec!["i-running".into(), "i-idle".into(), "i-orphan".into()], m.clone());
        let groups: Vec<Box<dyn ResourceGroup>> = vec![Box::new(group)];
        let cluster = StaticClusterManagerClient::new(vec![
            AgentInfo { instance_id: "i-running".into(), market: m.clone(), allocated_cpu: 2.0 },
            AgentInfo { instance_id: "i-idle".into(), market: m.clone(), allocated_cpu: 0.0 },
        ]);

        let summary = summarize("cluster1", "pool1", &groups, &cluster);
        let class_of = |id: &str| summary.instances.iter().find(|(i, _)| i == id).map(|(_, c)| c.clone());
        assert_eq!(class_of("i-running"), Some(InstanceClass::Running));
        assert_eq!(class_of("i-idle"), Some(InstanceClass::Idle));
        assert_eq!(class_of("i-orphan"), Some(InstanceClass::Orphaned));
    }
}
