//! Spot-fleet backed resource group.
//!
//! Weight for a market is read from the fleet's launch specifications.
//! Termination batches (≤500 ids per call) directly through the EC2
//! compute API rather than the fleet API, bypassing fleet termination
//! hooks for throughput — documented as intentional upstream.

use std::collections::HashMap;
use std::sync::RwLock;

use aws_sdk_ec2::Client as Ec2Client;
use clusterman_core::Market;

use crate::error::{ResourceGroupError, ResourceGroupResult};
use crate::group::{filter_owned_ids, BoxFuture, GroupKind, GroupStatus, ResourceGroup};

const BATCH_TERM_SIZE: usize = 500;

struct Snapshot {
    target_capacity: u64,
    instances: Vec<InstanceEntry>,
    market_weights: HashMap<Market, u64>,
    status: GroupStatus,
}

/// Map the fleet's own lifecycle state onto ours, as the original reads
/// `self._configuration['SpotFleetRequestState']` live on every status
/// check. An unrecognized state (future SDK addition) is treated as
/// `Failed` rather than silently kept `Active`.
fn map_group_status(state: Option<&aws_sdk_ec2::types::SpotFleetRequestState>) -> GroupStatus {
    use aws_sdk_ec2::types::SpotFleetRequestState as S;
    match state {
        Some(S::Active) => GroupStatus::Active,
        Some(S::Modifying) => GroupStatus::Modifying,
        Some(S::Submitted) => GroupStatus::Submitted,
        Some(S::Cancelled) => GroupStatus::Cancelled,
        Some(S::CancelledRunning) => GroupStatus::CancelledRunning,
        Some(S::CancelledTerminating) => GroupStatus::CancelledTerminating,
        Some(S::Failed) => GroupStatus::Failed,
        _ => GroupStatus::Failed,
    }
}

struct InstanceEntry {
    id: String,
    market: Market,
}

pub struct SpotFleetResourceGroup {
    fleet_id: String,
    client: Ec2Client,
    snapshot: RwLock<Snapshot>,
}

impl SpotFleetResourceGroup {
    pub fn new(fleet_id: impl Into<String>, client: Ec2Client, snapshot: FleetSnapshot) -> Self {
        Self {
            fleet_id: fleet_id.into(),
            client,
            snapshot: RwLock::new(Snapshot {
                target_capacity: snapshot.target_capacity,
                instances: snapshot
                    .instances
                    .into_iter()
                    .map(|(id, market)| InstanceEntry { id, market })
                    .collect(),
                market_weights: snapshot.market_weights,
                status: snapshot.status,
            }),
        }
    }

    /// Refresh this group's in-memory view from `describe_spot_fleet_instances`,
    /// paginating until no continuation token remains. Each active
    /// instance only carries an instance type, not an AZ, so a second
    /// batched `describe_instances` call resolves the market each
    /// instance actually occupies.
    pub async fn reload(&self) -> ResourceGroupResult<()> {
        let status = self.fetch_status().await?;

        let mut next_token: Option<String> = None;
        let mut active: Vec<(String, String)> = Vec::new();
        loop {
            let mut req = self
                .client
                .describe_spot_fleet_instances()
                .spot_fleet_request_id(&self.fleet_id);
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req.send().await.map_err(|e| ResourceGroupError::Provider {
                group_id: self.fleet_id.clone(),
                source: e.into(),
            })?;
            for inst in resp.active_instances() {
                if let (Some(id), Some(instance_type)) = (inst.instance_id(), inst.instance_type()) {
                    active.push((id.to_string(), instance_type.to_string()));
                }
            }
            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        let azs = self.resolve_availability_zones(active.iter().map(|(id, _)| id.clone()).collect()).await?;

        let instances: Vec<InstanceEntry> = active
            .into_iter()
            .filter_map(|(id, instance_type)| {
                let az = azs.get(&id)?;
                Some(InstanceEntry {
                    market: Market::new(instance_type, az.clone()),
                    id,
                })
            })
            .collect();

        {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.instances = instances;
            snapshot.status = status;
        }
        Ok(())
    }

    /// Re-read this fleet's own lifecycle state, the way the original
    /// re-reads `SpotFleetRequestState` on every status check rather
    /// than caching it across ticks.
    async fn fetch_status(&self) -> ResourceGroupResult<GroupStatus> {
        let resp = self
            .client
            .describe_spot_fleet_requests()
            .spot_fleet_request_ids(&self.fleet_id)
            .send()
            .await
            .map_err(|e| ResourceGroupError::Provider {
                group_id: self.fleet_id.clone(),
                source: e.into(),
            })?;
        let state = resp.spot_fleet_request_configs().first().and_then(|c| c.spot_fleet_request_state());
        Ok(map_group_status(state))
    }

    /// Resolve each instance id's availability zone via batched
    /// `describe_instances` calls (EC2 caps the ids-per-call, so this
    /// chunks rather than sending one request for the whole fleet).
    async fn resolve_availability_zones(&self, ids: Vec<String>) -> ResourceGroupResult<HashMap<String, String>> {
        const DESCRIBE_BATCH: usize = 200;
        let mut out = HashMap::new();
        for batch in ids.chunks(DESCRIBE_BATCH) {
            if batch.is_empty() {
                continue;
            }
            let resp = self
                .client
                .describe_instances()
                .set_instance_ids(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.fleet_id.clone(),
                    source: e.into(),
                })?;
            for reservation in resp.reservations() {
                for instance in reservation.instances() {
                    if let (Some(id), Some(az)) = (instance.instance_id(), instance.placement().and_then(|p| p.availability_zone())) {
                        out.insert(id.to_string(), az.to_string());
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Discovery-time data pulled from `describe_spot_fleet_requests` and
/// the fleet's launch specifications.
pub struct FleetSnapshot {
    pub target_capacity: u64,
    pub instances: Vec<(String, Market)>,
    pub market_weights: HashMap<Market, u64>,
    pub status: GroupStatus,
}

/// Discover every spot fleet tagged for `(cluster, pool)` with the
/// configured tag key, mirroring the ASG backend's tag-match contract.
pub async fn load(
    cluster: &str,
    pool: &str,
    tag_key: &str,
    client: &Ec2Client,
) -> ResourceGroupResult<HashMap<String, SpotFleetResourceGroup>> {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct RoleTag {
        pool: String,
        paasta_cluster: String,
    }

    let mut out = HashMap::new();
    let resp = client
        .describe_spot_fleet_requests()
        .send()
        .await
        .map_err(|e| ResourceGroupError::Discovery(e.into()))?;

    for fleet in resp.spot_fleet_request_configs() {
        let Some(fleet_id) = fleet.spot_fleet_request_id() else { continue };
        let Some(config) = fleet.spot_fleet_request_config() else { continue };
        let Some(tag) = config.tag_specifications().iter().flat_map(|spec| spec.tags()).find(|t| t.key() == Some(tag_key)) else {
            continue;
        };
        let Some(value) = tag.value() else { continue };
        let Ok(parsed) = serde_json::from_str::<RoleTag>(value) else {
            continue;
        };
        if parsed.pool != pool || parsed.paasta_cluster != cluster {
            continue;
        }

        let mut market_weights = HashMap::new();
        for spec in config.launch_specifications() {
            if let (Some(instance_type), Some(az), Some(weight)) =
                (spec.instance_type(), spec.placement().and_then(|p| p.availability_zone()), spec.weighted_capacity())
            {
                market_weights.insert(Market::new(instance_type.as_str(), az), weight as u64);
            }
        }

        let snapshot = FleetSnapshot {
            target_capacity: config.target_capacity().max(0) as u64,
            instances: Vec::new(),
            market_weights,
            status: map_group_status(fleet.spot_fleet_request_state()),
        };
        let group = SpotFleetResourceGroup::new(fleet_id, client.clone(), snapshot);
        group.reload().await?;
        out.insert(fleet_id.to_string(), group);
    }
    Ok(out)
}

impl ResourceGroup for SpotFleetResourceGroup {
    fn id(&self) -> &str {
        &self.fleet_id
    }

    fn kind(&self) -> GroupKind {
        GroupKind::SpotFleet
    }

    fn status(&self) -> GroupStatus {
        self.snapshot.read().unwrap().status
    }

    fn is_stale(&self) -> bool {
        false
    }

    fn target_capacity(&self) -> u64 {
        self.snapshot.read().unwrap().target_capacity
    }

    fn fulfilled_capacity(&self) -> u64 {
        let snapshot = self.snapshot.read().unwrap();
        snapshot
            .instances
            .iter()
            .map(|inst| snapshot.market_weights.get(&inst.market).copied().unwrap_or(0))
            .sum()
    }

    fn instance_ids(&self) -> Vec<String> {
        self.snapshot.read().unwrap().instances.iter().map(|i| i.id.clone()).collect()
    }

    fn market_weight(&self, market: &Market) -> u64 {
        self.snapshot.read().unwrap().market_weights.get(market).copied().unwrap_or(0)
    }

    fn market_capacities(&self) -> HashMap<Market, u64> {
        let snapshot = self.snapshot.read().unwrap();
        let mut out: HashMap<Market, u64> = HashMap::new();
        for inst in snapshot.instances.iter() {
            let weight = snapshot.market_weights.get(&inst.market).copied().unwrap_or(0);
            *out.entry(inst.market.clone()).or_insert(0) += weight;
        }
        out
    }

    fn modify_target_capacity<'a>(
        &'a self,
        new_target: u64,
        terminate_excess_capacity: bool,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<()>> {
        Box::pin(async move {
            tracing::info!(fleet_id = %self.fleet_id, new_target, terminate_excess_capacity, dry_run, "setting spot fleet target capacity");
            if dry_run {
                return Ok(());
            }
            self.client
                .modify_spot_fleet_request()
                .spot_fleet_request_id(&self.fleet_id)
                .target_capacity(new_target as i32)
                .excess_capacity_termination_policy(if terminate_excess_capacity {
                    aws_sdk_ec2::types::ExcessCapacityTerminationPolicy::Default
                } else {
                    aws_sdk_ec2::types::ExcessCapacityTerminationPolicy::NoTermination
                })
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.fleet_id.clone(),
                    source: e.into(),
                })?;
            self.snapshot.write().unwrap().target_capacity = new_target;
            Ok(())
        })
    }

    fn terminate_instances_by_id<'a>(
        &'a self,
        ids: Vec<String>,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<Vec<String>>> {
        Box::pin(async move {
            let owned = filter_owned_ids(self, &ids);
            if owned.is_empty() {
                tracing::warn!(fleet_id = %self.fleet_id, "no instances to terminate");
                return Ok(Vec::new());
            }
            if dry_run {
                return Ok(owned);
            }

            let mut terminated = Vec::new();
            let mut terminated_weight: u64 = 0;
            for batch in owned.chunks(BATCH_TERM_SIZE) {
                let resp = self
                    .client
                    .terminate_instances()
                    .set_instance_ids(Some(batch.to_vec()))
                    .send()
                    .await
                    .map_err(|e| ResourceGroupError::Provider {
                        group_id: self.fleet_id.clone(),
                        source: e.into(),
                    })?;
                for inst in resp.terminating_instances() {
                    if let Some(id) = inst.instance_id() {
                        terminated.push(id.to_string());
                    }
                }
            }

            {
                let mut snapshot = self.snapshot.write().unwrap();
                for inst in snapshot.instances.iter().filter(|i| terminated.contains(&i.id)) {
                    terminated_weight += snapshot.market_weights.get(&inst.market).copied().unwrap_or(0);
                }
                snapshot.instances.retain(|i| !terminated.contains(&i.id));
            }

            // Decrement target_capacity by the terminated weight so the
            // fleet doesn't immediately replenish what we just removed.
            let new_target = self.target_capacity().saturating_sub(terminated_weight);
            self.client
                .modify_spot_fleet_request()
                .spot_fleet_request_id(&self.fleet_id)
                .target_capacity(new_target as i32)
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.fleet_id.clone(),
                    source: e.into(),
                })?;
            self.snapshot.write().unwrap().target_capacity = new_target;

            let missing: Vec<&String> = owned.iter().filter(|id| !terminated.contains(id)).collect();
            if !missing.is_empty() {
                tracing::warn!(fleet_id = %self.fleet_id, ?missing, "some instances could not be terminated; probably killed previously");
            }
            tracing::info!(fleet_id = %self.fleet_id, ?terminated, "terminated spot fleet instances");
            Ok(terminated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::SpotFleetRequestState as S;

    #[test]
    fn maps_every_known_lifecycle_state() {
        assert_eq!(map_group_status(Some(&S::Active)), GroupStatus::Active);
        assert_eq!(map_group_status(Some(&S::Modifying)), GroupStatus::Modifying);
        assert_eq!(map_group_status(Some(&S::Submitted)), GroupStatus::Submitted);
        assert_eq!(map_group_status(Some(&S::Cancelled)), GroupStatus::Cancelled);
        assert_eq!(map_group_status(Some(&S::CancelledRunning)), GroupStatus::CancelledRunning);
        assert_eq!(map_group_status(Some(&S::CancelledTerminating)), GroupStatus::CancelledTerminating);
        assert_eq!(map_group_status(Some(&S::Failed)), GroupStatus::Failed);
    }

    #[test]
    fn missing_state_is_treated_as_failed_not_active() {
        assert_eq!(map_group_status(None), GroupStatus::Failed);
    }
}
