//! §4.2.2: terminate idle agents, heaviest markets first, until
//! fulfilled capacity reaches the new target — without ever dropping
//! a group below its per-group minimum or the pool below its
//! pool-wide minimum.

use std::collections::HashMap;

use clusterman_core::Market;
use clusterman_resource_groups::ResourceGroup;

use crate::cluster::{AgentInfo, ClusterManagerClient};

/// A planned set of terminations, one list of instance ids per group,
/// ready for the pool manager to execute against each group's
/// `terminate_instances_by_id`.
#[derive(Debug, Default, PartialEq)]
pub struct PrunePlan {
    pub terminations_by_group: HashMap<String, Vec<String>>,
}

impl PrunePlan {
    pub fn total_planned(&self) -> usize {
        self.terminations_by_group.values().map(|v| v.len()).sum()
    }
}

/// Compute which idle agents to terminate, without performing any
/// provider call — a pure function over the pool's current groups and
/// the cluster manager's agent listing, so it can be unit-tested with
/// in-memory doubles.
pub fn plan_pruning(
    groups: &[Box<dyn ResourceGroup>],
    cluster: &dyn ClusterManagerClient,
    pool_min_capacity: u64,
    target: u64,
) -> PrunePlan {
    let mut fulfilled: u64 = groups.iter().map(|g| g.fulfilled_capacity()).sum();
    if fulfilled <= target {
        return PrunePlan::default();
    }

    // Owning group lookup: instance id -> group index.
    let mut owner: HashMap<String, usize> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        for id in group.instance_ids() {
            owner.insert(id, i);
        }
    }

    let idle_agents: Vec<AgentInfo> = cluster.list_agents().into_iter().filter(|a| a.is_idle() && owner.contains_key(&a.instance_id)).collect();

    let mut idle_by_market: HashMap<Market, Vec<AgentInfo>> = HashMap::new();
    for agent in idle_agents {
        idle_by_market.entry(agent.market.clone()).or_default().push(agent);
    }

    let mut market_capacities: HashMap<Market, u64> = HashMap::new();
    for group in groups {
        for (market, weight) in group.market_capacities() {
            *market_capacities.entry(market).or_insert(0) += weight;
        }
    }

    let mut group_planned_terminations: Vec<u64> = vec![0; groups.len()];
    let mut plan = PrunePlan::default();

    while fulfilled > target {
        let Some(market) = heaviest_market_with_idle_candidates(&idle_by_market, &market_capacities) else {
            break;
        };

        let Some(agent) = idle_by_market.get(&market).and_then(|v| v.first()).cloned() else {
            idle_by_market.remove(&market);
            continue;
        };

        let group_idx = owner[&agent.instance_id];
        let group = &groups[group_idx];
        let weight = group.market_weight(&market);
        let group_remaining = group.fulfilled_capacity().saturating_sub(group_planned_terminations[group_idx]);

        if let Err(skip) = check_candidate(group.as_ref(), group_remaining, weight, fulfilled, pool_min_capacity) {
            tracing::debug!(instance_id = %agent.instance_id, reason = %skip, "skipping prune candidate");
            remove_candidate(&mut idle_by_market, &market, &agent.instance_id);
            continue;
        }

        plan.terminations_by_group.entry(group.id().to_string()).or_default().push(agent.instance_id.clone());
        group_planned_terminations[group_idx] += weight;
        fulfilled = fulfilled.saturating_sub(weight);
        *market_capacities.get_mut(&market).unwrap() = market_capacities[&market].saturating_sub(weight);
        remove_candidate(&mut idle_by_market, &market, &agent.instance_id);
    }

    plan
}

/// Would terminating this agent drop its group below its per-group
/// minimum, or the pool below its pool-wide minimum? Returns the
/// specific protection that fired, mirroring §4.2.2 step 3c's
/// `MarketProtected`/`ResourceGroupProtected` internal signals — never
/// surfaced past this module.
fn check_candidate(group: &dyn ResourceGroup, group_remaining: u64, weight: u64, pool_fulfilled: u64, pool_min_capacity: u64) -> Result<(), crate::error::PruneSkip> {
    if group.status().is_active() && group_remaining >= 1 && group_remaining.saturating_sub(weight) < 1 {
        return Err(crate::error::PruneSkip::ResourceGroupProtected(group.id().to_string()));
    }
    if pool_fulfilled.saturating_sub(weight) < pool_min_capacity {
        return Err(crate::error::PruneSkip::MarketProtected(format!("pool floor {pool_min_capacity}")));
    }
    Ok(())
}

fn remove_candidate(idle_by_market: &mut HashMap<Market, Vec<AgentInfo>>, market: &Market, instance_id: &str) {
    if let Some(list) = idle_by_market.get_mut(market) {
        list.retain(|a| a.instance_id != instance_id);
        if list.is_empty() {
            idle_by_market.remove(market);
        }
    }
}

fn heaviest_market_with_idle_candidates(
    idle_by_market: &HashMap<Market, Vec<AgentInfo>>,
    market_capacities: &HashMap<Market, u64>,
) -> Option<Market> {
    idle_by_market
        .keys()
        .max_by(|a, b| {
            let wa = market_capacities.get(*a).copied().unwrap_or(0);
            let wb = market_capacities.get(*b).copied().unwrap_or(0);
            wa.cmp(&wb).then_with(|| b.cmp(a)) // lexicographic tie-break: smaller market wins ties
        })
        .cloned()
}
