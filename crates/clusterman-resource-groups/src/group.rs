//! The resource-group contract (§4.1): every backend exposes this
//! capability set regardless of which cloud primitive backs it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use clusterman_core::Market;

use crate::error::ResourceGroupResult;

/// Boxed future alias, following `warpgrid_autoscale::scaler::BoxFuture` —
/// kept so `ResourceGroup` stays object-safe and usable as
/// `Vec<Box<dyn ResourceGroup>>` in the pool manager.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which cloud primitive a resource group is backed by. Used as the
/// static dispatch key in [`crate::registry`] — no runtime class
/// lookup is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    SpotFleet,
    AutoScaling,
}

impl GroupKind {
    pub fn tag(&self) -> &'static str {
        match self {
            GroupKind::SpotFleet => "sfr",
            GroupKind::AutoScaling => "asg",
        }
    }
}

/// Lifecycle status of a resource group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Active,
    Modifying,
    Submitted,
    Cancelled,
    CancelledRunning,
    CancelledTerminating,
    Failed,
}

impl GroupStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, GroupStatus::Active)
    }
}

/// A handle to one cloud-managed fleet contributing capacity to a pool.
///
/// Created by a backend's discovery call, held for the tick's
/// duration, never mutated by the core except through
/// `modify_target_capacity` and `terminate_instances_by_id`.
pub trait ResourceGroup: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> GroupKind;
    fn status(&self) -> GroupStatus;

    /// True once the group has been marked for decommissioning; its
    /// target is treated as 0 and it is never rebalanced up.
    fn is_stale(&self) -> bool;

    fn target_capacity(&self) -> u64;

    /// Σ market_weight(m) × |instances in m|.
    fn fulfilled_capacity(&self) -> u64;

    /// Current membership, as of the last discovery/reload.
    fn instance_ids(&self) -> Vec<String>;

    /// Weight of this group in a market; 0 means "cannot host that market."
    fn market_weight(&self, market: &Market) -> u64;

    /// Total weight currently present per market.
    fn market_capacities(&self) -> HashMap<Market, u64>;

    /// Set the backend's desired size. Must clamp to the backend's own
    /// (min, max) bounds, logging when clamping occurs, and must honor
    /// `dry_run` by returning without side effects.
    fn modify_target_capacity<'a>(
        &'a self,
        new_target: u64,
        terminate_excess_capacity: bool,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<()>>;

    /// Terminate only ids this group currently owns. Implementations
    /// must filter through [`filter_owned_ids`] before making any
    /// provider call.
    fn terminate_instances_by_id<'a>(
        &'a self,
        ids: Vec<String>,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<Vec<String>>>;
}

/// Ownership guard: any id not in `group.instance_ids()` is filtered
/// out and logged. Every backend's `terminate_instances_by_id` must
/// call this before issuing any provider call — instance identifiers
/// not owned by any group must never be terminated by any path.
pub fn filter_owned_ids(group: &dyn ResourceGroup, ids: &[String]) -> Vec<String> {
    let owned: std::collections::HashSet<String> = group.instance_ids().into_iter().collect();
    let mut kept = Vec::with_capacity(ids.len());
    for id in ids {
        if owned.contains(id) {
            kept.push(id.clone());
        } else {
            tracing::warn!(group_id = group.id(), instance_id = %id, "refusing to terminate instance not owned by this group");
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeResourceGroup;

    #[test]
    fn filter_owned_ids_drops_unowned_instances() {
        let group = FakeResourceGroup::new("grp-1", GroupKind::AutoScaling)
            .with_instances(vec!["i-1".into(), "i-2".into()]);
        let filtered = filter_owned_ids(&group, &["i-1".into(), "i-999".into()]);
        assert_eq!(filtered, vec!["i-1".to_string()]);
    }

    #[test]
    fn filter_owned_ids_keeps_all_when_all_owned() {
        let group = FakeResourceGroup::new("grp-1", GroupKind::AutoScaling)
            .with_instances(vec!["i-1".into(), "i-2".into()]);
        let filtered = filter_owned_ids(&group, &["i-1".into(), "i-2".into()]);
        assert_eq!(filtered, vec!["i-1".to_string(), "i-2".to_string()]);
    }
}
