//! An in-memory resource group for tests, following
//! `warpgrid_state::StateStore::open_in_memory`'s practice of a
//! test-only construction path instead of mocking the trait.

use std::collections::HashMap;
use std::sync::Mutex;

use clusterman_core::Market;

use crate::error::ResourceGroupResult;
use crate::group::{BoxFuture, GroupKind, GroupStatus, ResourceGroup};

pub struct FakeResourceGroup {
    id: String,
    kind: GroupKind,
    status: GroupStatus,
    stale: bool,
    state: Mutex<FakeState>,
    weights: HashMap<Market, u64>,
}

struct FakeState {
    target_capacity: u64,
    instances: Vec<(String, Market)>,
}

impl FakeResourceGroup {
    pub fn new(id: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: GroupStatus::Active,
            stale: false,
            state: Mutex::new(FakeState {
                target_capacity: 0,
                instances: Vec::new(),
            }),
            weights: HashMap::new(),
        }
    }

    pub fn with_target(self, target: u64) -> Self {
        self.state.lock().unwrap().target_capacity = target;
        self
    }

    pub fn with_instances(self, ids: Vec<String>) -> Self {
        let market = Market::new("m5.xlarge", "us-west-2a");
        self.state.lock().unwrap().instances = ids.into_iter().map(|id| (id, market.clone())).collect();
        self
    }

    pub fn with_instances_in_market(self, ids: Vec<String>, market: Market) -> Self {
        self.state.lock().unwrap().instances = ids.into_iter().map(|id| (id, market.clone())).collect();
        self
    }

    pub fn with_weight(mut self, market: Market, weight: u64) -> Self {
        self.weights.insert(market, weight);
        self
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

impl ResourceGroup for FakeResourceGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> GroupKind {
        self.kind
    }

    fn status(&self) -> GroupStatus {
        self.status
    }

    fn is_stale(&self) -> bool {
        self.stale
    }

    fn target_capacity(&self) -> u64 {
        self.state.lock().unwrap().target_capacity
    }

    fn fulfilled_capacity(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state
            .instances
            .iter()
            .map(|(_, market)| self.weights.get(market).copied().unwrap_or(1))
            .sum()
    }

    fn instance_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().instances.iter().map(|(id, _)| id.clone()).collect()
    }

    fn market_weight(&self, market: &Market) -> u64 {
        self.weights.get(market).copied().unwrap_or(0)
    }

    fn market_capacities(&self) -> HashMap<Market, u64> {
        let state = self.state.lock().unwrap();
        let mut out: HashMap<Market, u64> = HashMap::new();
        for (_, market) in state.instances.iter() {
            *out.entry(market.clone()).or_insert(0) += self.weights.get(market).copied().unwrap_or(1);
        }
        out
    }

    fn modify_target_capacity<'a>(
        &'a self,
        new_target: u64,
        _terminate_excess_capacity: bool,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<()>> {
        Box::pin(async move {
            if !dry_run {
                self.state.lock().unwrap().target_capacity = new_target;
            }
            Ok(())
        })
    }

    fn terminate_instances_by_id<'a>(
        &'a self,
        ids: Vec<String>,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<Vec<String>>> {
        Box::pin(async move {
            let owned = crate::group::filter_owned_ids(self, &ids);
            if !dry_run {
                let mut state = self.state.lock().unwrap();
                state.instances.retain(|(id, _)| !owned.contains(id));
            }
            Ok(owned)
        })
    }
}
