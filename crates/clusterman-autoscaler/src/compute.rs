//! §4.4 `compute_target_capacity`: turn a resource request into a new
//! pool-wide target, as a pure function over the numbers the pool
//! manager already exposes — no I/O, fully unit-testable.

use clusterman_core::{AutoscalingConfig, Resource, ResourceRequest};

/// Everything `compute_target_capacity` needs from the pool, decoupled
/// from `PoolManager` itself so this stays a pure function.
#[derive(Debug, Clone, Copy)]
pub struct PoolCapacitySnapshot {
    pub current_target: u64,
    pub non_orphan_fulfilled_capacity: u64,
    pub resource_total: u64,
}

/// §4.4 steps 1-6. Returns the new pool-wide target, not yet
/// constrained to `PoolConfig`'s bounds — that happens inside
/// `PoolManager::modify_target_capacity`.
pub fn compute_target_capacity(request: &ResourceRequest, pool: PoolCapacitySnapshot, config: &AutoscalingConfig) -> u64 {
    if request.is_no_decision() {
        tracing::info!("no data from signal, not changing capacity");
        return pool.current_target;
    }

    let Some((resource, utilization_pct)) = most_constrained_resource(request, pool.resource_total) else {
        return pool.current_target;
    };
    tracing::info!(%resource, utilization_pct, "most constrained resource for this request");

    // We want to scale the cluster so that requested / (total * scale_factor) = setpoint.
    // We already have requested/total in the form of utilization_pct, so we can solve for scale_factor:
    let scale_factor = utilization_pct / config.setpoint;

    // Because we scale by the percentage of the "most fulfilled resource" we want to make sure that the
    // target capacity change is based on what's currently present. A simple example illustrates the point:
    //
    //   * Suppose we have target_capacity = 50, fulfilled_capacity = 10, and setpoint = 0.5
    //   * The signal requests 100 CPUs, and the cluster manager says there are 200 CPUs in the cluster
    //     (this is the non_orphan_fulfilled_capacity)
    //   * The new target capacity in this case should be 10, not 100 (as it would be if we scaled off the
    //     current target_capacity)
    //
    // This also ensures that the right behavior happens when rolling a resource group. To see this, let
    // X be the target_capacity of the original resource group; if we create the new resource group with target
    // capacity X, then our non_orphan_fulfilled_capacity will (eventually) be 2X and our scale_factor will be
    // (setpoint / 2) / setpoint (assuming the utilization doesn't change), so our new target_capacity will be X.
    // Since stale resource groups have a target_capacity of 0 and aren't included in modify_target_capacity
    // calculations, this ensures the correct behavior. The math here continues to work out as the old resource
    // group scales down, because as the fulfilled_capacity decreases, the scale_factor increases by the same
    // amount.
    let new_target = (pool.non_orphan_fulfilled_capacity as f64 * scale_factor).round().max(0.0) as u64;

    if pool.current_target == 0 {
        return new_target;
    }
    let setpoint_distance = (new_target as f64 - pool.current_target as f64).abs() / pool.current_target as f64;
    tracing::info!(setpoint_distance, margin = config.setpoint_margin, "distance from setpoint");
    if setpoint_distance < config.setpoint_margin {
        tracing::info!("within setpoint margin, not changing target capacity");
        pool.current_target
    } else {
        new_target
    }
}

/// The resource with the highest utilization percentage, among those
/// present in the request.
fn most_constrained_resource(request: &ResourceRequest, resource_total: u64) -> Option<(Resource, f64)> {
    Resource::ALL
        .into_iter()
        .filter_map(|r| request.get(r).map(|v| (r, v / resource_total.max(1) as f64)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(setpoint: f64, margin: f64) -> AutoscalingConfig {
        AutoscalingConfig {
            setpoint,
            setpoint_margin: margin,
            cpus_per_weight: 1,
        }
    }

    #[test]
    fn all_absent_request_leaves_target_unchanged() {
        let snapshot = PoolCapacitySnapshot {
            current_target: 50,
            non_orphan_fulfilled_capacity: 50,
            resource_total: 100,
        };
        let result = compute_target_capacity(&ResourceRequest::default(), snapshot, &config(0.7, 0.1));
        assert_eq!(result, 50);
    }

    #[test]
    fn hysteresis_suppresses_small_changes() {
        let snapshot = PoolCapacitySnapshot {
            current_target: 100,
            non_orphan_fulfilled_capacity: 100,
            resource_total: 100,
        };
        // setpoint=0.7 margin=0.1; a request that computes to new_target=105 should be suppressed.
        let request = ResourceRequest {
            cpus: Some(73.5),
            ..Default::default()
        };
        let result = compute_target_capacity(&request, snapshot, &config(0.7, 0.1));
        assert_eq!(result, 100, "change of ~5% is within the 10% margin");
    }

    #[test]
    fn large_deviation_scales_past_the_margin() {
        let snapshot = PoolCapacitySnapshot {
            current_target: 100,
            non_orphan_fulfilled_capacity: 100,
            resource_total: 100,
        };
        let request = ResourceRequest {
            cpus: Some(98.0),
            ..Default::default()
        };
        let result = compute_target_capacity(&request, snapshot, &config(0.7, 0.1));
        assert!(result > 100, "98% utilization against a 70% setpoint should scale up");
    }

    #[test]
    fn rollout_doubling_fulfilled_capacity_keeps_target_constant() {
        // Old group at target X=50 (fulfilled=50). A new group comes up
        // alongside it with target X too, so fulfilled becomes 2X=100
        // while utilization (same workload) halves accordingly.
        let snapshot_before = PoolCapacitySnapshot {
            current_target: 50,
            non_orphan_fulfilled_capacity: 50,
            resource_total: 50,
        };
        let request_before = ResourceRequest {
            cpus: Some(35.0), // 70% utilization, exactly at setpoint
            ..Default::default()
        };
        let before = compute_target_capacity(&request_before, snapshot_before, &config(0.7, 0.0));
        assert_eq!(before, 50);

        let snapshot_during_rollout = PoolCapacitySnapshot {
            current_target: 50,
            non_orphan_fulfilled_capacity: 100,
            resource_total: 100,
        };
        let request_during_rollout = ResourceRequest {
            cpus: Some(35.0), // same workload, now 35% of doubled total
            ..Default::default()
        };
        let during = compute_target_capacity(&request_during_rollout, snapshot_during_rollout, &config(0.7, 0.0));
        assert_eq!(during, 50, "target should not double just because a rollout doubled fulfilled capacity");
    }

    #[test]
    fn picks_the_most_constrained_resource_among_several() {
        let snapshot = PoolCapacitySnapshot {
            current_target: 100,
            non_orphan_fulfilled_capacity: 100,
            resource_total: 100,
        };
        let request = ResourceRequest {
            cpus: Some(50.0),
            mem: Some(90.0),
            disk: Some(10.0),
        };
        // mem is most constrained at 90%, well above the 70% setpoint.
        let result = compute_target_capacity(&request, snapshot, &config(0.7, 0.0));
        assert!(result > 100);
    }
}
