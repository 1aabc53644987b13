//! End-to-end pool manager scenarios, exercising
//! `modify_target_capacity`'s full sequence (clamp, rebalance, churn
//! cap, apply, prune) across several resource groups at once rather
//! than any single stage in isolation.

use clusterman_core::{Market, PoolConfig};
use clusterman_pool::{PoolManager, StaticClusterManagerClient};
use clusterman_resource_groups::testutil::FakeResourceGroup;
use clusterman_resource_groups::{GroupKind, ResourceGroup};

fn capacity(min: u64, max: u64, max_add: u64, max_remove: u64) -> PoolConfig {
    PoolConfig {
        min_capacity: min,
        max_capacity: max,
        max_weight_to_add: max_add,
        max_weight_to_remove: max_remove,
    }
}

fn market() -> Market {
    Market::new("m5.xlarge", "us-west-2a")
}

fn groups(targets: &[u64]) -> Vec<Box<dyn ResourceGroup>> {
    targets
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            Box::new(
                FakeResourceGroup::new(format!("sfr-{i}"), GroupKind::SpotFleet)
                    .with_target(t)
                    .with_weight(market(), 1),
            ) as Box<dyn ResourceGroup>
        })
        .collect()
}

#[tokio::test]
async fn scale_up_distributes_evenly_across_balanced_groups() {
    let mut pool = PoolManager::new("prod", "default", capacity(5, 1000, 1000, 1000), groups(&[10, 10, 10, 10, 10]));
    let cluster = StaticClusterManagerClient::new(vec![]);

    let achieved = pool.modify_target_capacity(53, false, &cluster).await.unwrap();

    assert_eq!(achieved, 53);
    let got: Vec<u64> = pool.groups().iter().map(|g| g.target_capacity()).collect();
    assert_eq!(got, vec![11, 11, 11, 10, 10]);
}

#[tokio::test]
async fn scale_up_is_capped_by_max_weight_to_add() {
    let mut pool = PoolManager::new("prod", "default", capacity(5, 1000, 5, 1000), groups(&[10, 10, 10, 10, 10]));
    let cluster = StaticClusterManagerClient::new(vec![]);

    let achieved = pool.modify_target_capacity(100, false, &cluster).await.unwrap();

    assert_eq!(achieved, 55);
}

#[tokio::test]
async fn scale_down_prunes_idle_agents_from_the_heaviest_market() {
    let light = market();
    let heavy = Market::new("c5.4xlarge", "us-west-2b");

    let light_group = Box::new(
        FakeResourceGroup::new("sfr-light", GroupKind::SpotFleet)
            .with_target(5)
            .with_instances_in_market(vec!["i-light-1".into(), "i-light-2".into(), "i-light-3".into(), "i-light-4".into(), "i-light-5".into()], light.clone())
            .with_weight(light.clone(), 1),
    ) as Box<dyn ResourceGroup>;
    let heavy_group = Box::new(
        FakeResourceGroup::new("sfr-heavy", GroupKind::SpotFleet)
            .with_target(5)
            .with_instances_in_market(vec!["i-heavy-1".into(), "i-heavy-2".into(), "i-heavy-3".into(), "i-heavy-4".into(), "i-heavy-5".into()], heavy.clone())
            .with_weight(heavy.clone(), 2),
    ) as Box<dyn ResourceGroup>;

    let mut pool = PoolManager::new("prod", "default", capacity(2, 1000, 1000, 1000), vec![light_group, heavy_group]);

    // Every agent is idle except one in the heavy market, so pruning
    // should pick heavy-market instances first once capacity is
    // reduced below what's currently fulfilled.
    let agents = vec![
        clusterman_pool::AgentInfo { instance_id: "i-light-1".into(), market: light.clone(), allocated_cpu: 0.0 },
        clusterman_pool::AgentInfo { instance_id: "i-light-2".into(), market: light.clone(), allocated_cpu: 0.0 },
        clusterman_pool::AgentInfo { instance_id: "i-heavy-1".into(), market: heavy.clone(), allocated_cpu: 0.0 },
        clusterman_pool::AgentInfo { instance_id: "i-heavy-2".into(), market: heavy.clone(), allocated_cpu: 4.0 },
    ];
    let cluster = StaticClusterManagerClient::new(agents);

    let achieved = pool.modify_target_capacity(10, false, &cluster).await.unwrap();
    assert!(achieved <= 15, "achieved total should have shrunk toward the desired capacity");

    let heavy_ids = pool.groups()[1].instance_ids();
    assert!(!heavy_ids.contains(&"i-heavy-1".to_string()), "idle heavy-market instance should be pruned first");
}

#[tokio::test]
async fn dry_run_computes_without_mutating_any_group() {
    let mut pool = PoolManager::new("prod", "default", capacity(5, 1000, 1000, 1000), groups(&[10, 10, 10]));
    let cluster = StaticClusterManagerClient::new(vec![]);

    let achieved = pool.modify_target_capacity(60, true, &cluster).await.unwrap();

    assert_eq!(achieved, 60);
    let got: Vec<u64> = pool.groups().iter().map(|g| g.target_capacity()).collect();
    assert_eq!(got, vec![10, 10, 10], "dry run must not touch group state");
}

#[tokio::test]
async fn desired_capacity_is_clamped_to_pool_bounds() {
    let mut pool = PoolManager::new("prod", "default", capacity(20, 40, 1000, 1000), groups(&[10, 10]));
    let cluster = StaticClusterManagerClient::new(vec![]);

    let achieved = pool.modify_target_capacity(5, false, &cluster).await.unwrap();
    assert_eq!(achieved, 20, "below-minimum desired capacity clamps up to the pool floor");

    let achieved = pool.modify_target_capacity(1000, false, &cluster).await.unwrap();
    assert_eq!(achieved, 40, "above-maximum desired capacity clamps down to the pool ceiling");
}
