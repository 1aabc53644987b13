//! §4.2.1: split a pool-wide target across N non-stale resource
//! groups, equalizing as much as possible without ever lowering a
//! group on scale-up or raising one on scale-down.

/// One resource group's identity and current target, as seen by the
/// rebalancing algorithm.
#[derive(Debug, Clone)]
pub struct RebalanceInput {
    pub id: String,
    pub current_target: u64,
    pub stale: bool,
}

/// Split `pool_target` across the non-stale entries in `inputs`,
/// returning new targets in the same order as `inputs` (the
/// positional-list return the expanded spec standardizes on). Stale
/// entries always receive 0 and do not count toward `pool_target`'s
/// distribution.
pub fn rebalance(inputs: &[RebalanceInput], pool_target: u64) -> Vec<u64> {
    let mut order: Vec<usize> = (0..inputs.len()).filter(|&i| !inputs[i].stale).collect();
    // Sort ascending by (current_target, id) — the deterministic
    // tie-break the algorithm requires.
    order.sort_by(|&a, &b| inputs[a].current_target.cmp(&inputs[b].current_target).then(inputs[a].id.cmp(&inputs[b].id)));

    let n = order.len();
    let mut result = vec![0u64; inputs.len()];
    if n == 0 {
        return result;
    }

    let sum_current: u64 = order.iter().map(|&i| inputs[i].current_target).sum();
    let scale_up = pool_target >= sum_current;

    let mut pinned = vec![false; n];
    let mut budget = pool_target;
    let mut remaining = n;

    if scale_up {
        // Process from the high end: the largest current targets are
        // the ones most likely to already be above the equal share,
        // and must not be lowered.
        for pos in (0..n).rev() {
            if remaining == 0 {
                break;
            }
            let idx = order[pos];
            let share = budget as f64 / remaining as f64;
            if (inputs[idx].current_target as f64) > share {
                pinned[pos] = true;
                budget -= inputs[idx].current_target;
                remaining -= 1;
            } else {
                break;
            }
        }
    } else {
        // Process from the low end: the smallest current targets are
        // the ones most likely to already be below the equal share,
        // and must not be raised.
        for pos in 0..n {
            if remaining == 0 {
                break;
            }
            let idx = order[pos];
            let share = budget as f64 / remaining as f64;
            if (inputs[idx].current_target as f64) < share {
                pinned[pos] = true;
                budget -= inputs[idx].current_target;
                remaining -= 1;
            } else {
                break;
            }
        }
    }

    for (pos, &idx) in order.iter().enumerate() {
        if pinned[pos] {
            result[idx] = inputs[idx].current_target;
        }
    }

    if remaining > 0 {
        let floor = budget / remaining as u64;
        let ceil_count = budget % remaining as u64;
        let mut assigned = 0u64;
        for (pos, &idx) in order.iter().enumerate() {
            if pinned[pos] {
                continue;
            }
            result[idx] = if assigned < ceil_count { floor + 1 } else { floor };
            assigned += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(targets: &[(&str, u64)]) -> Vec<RebalanceInput> {
        targets
            .iter()
            .map(|(id, t)| RebalanceInput {
                id: (*id).to_string(),
                current_target: *t,
                stale: false,
            })
            .collect()
    }

    fn sorted(mut v: Vec<u64>) -> Vec<u64> {
        v.sort();
        v
    }

    #[test]
    fn balanced_scale_up() {
        let inputs = inputs(&[("a", 1), ("b", 1), ("c", 1), ("d", 1), ("e", 1)]);
        let result = rebalance(&inputs, 53);
        assert_eq!(sorted(result), vec![10, 10, 11, 11, 11]);
    }

    #[test]
    fn imbalanced_scale_up_pins_the_outlier() {
        let inputs = inputs(&[("a", 10), ("b", 10), ("c", 11), ("d", 11), ("e", 30)]);
        // pool-wide max_capacity of 101 has already clamped the desired target.
        let result = rebalance(&inputs, 101);
        assert_eq!(sorted(result), vec![17, 18, 18, 18, 30]);
    }

    #[test]
    fn scale_down_never_raises_an_externally_dropped_group() {
        let inputs = inputs(&[("a", 1), ("b", 16), ("c", 16), ("d", 16), ("e", 16)]);
        let result = rebalance(&inputs, 22);
        assert_eq!(sorted(result), vec![1, 5, 5, 5, 6]);
    }

    #[test]
    fn sum_equals_constrained_target() {
        let inputs = inputs(&[("a", 3), ("b", 7), ("c", 2), ("d", 40)]);
        for target in [0u64, 1, 5, 13, 52, 200] {
            let result = rebalance(&inputs, target);
            assert_eq!(result.iter().sum::<u64>(), target, "target={target}");
        }
    }

    #[test]
    fn monotonic_on_scale_up_no_group_shrinks() {
        let inputs = inputs(&[("a", 3), ("b", 7), ("c", 2), ("d", 40)]);
        let before = rebalance(&inputs, 52);
        let after = rebalance(&inputs, 90);
        for (b, a) in before.iter().zip(after.iter()) {
            assert!(a >= b);
        }
    }

    #[test]
    fn monotonic_on_scale_down_no_group_grows() {
        let inputs = inputs(&[("a", 3), ("b", 7), ("c", 2), ("d", 40)]);
        let before = rebalance(&inputs, 52);
        let after = rebalance(&inputs, 10);
        for (b, a) in before.iter().zip(after.iter()) {
            assert!(a <= b);
        }
    }

    #[test]
    fn equal_current_targets_bound_new_targets_by_ceil_and_floor_share() {
        let inputs = inputs(&[("a", 10), ("b", 10), ("c", 10), ("d", 10), ("e", 10)]);
        let result = rebalance(&inputs, 53);
        let n = inputs.len() as u64;
        let ceil_share = 53u64.div_ceil(n);
        let floor_share = 53 / n;
        assert!(result.iter().min().copied().unwrap() <= ceil_share);
        assert!(result.iter().max().copied().unwrap() >= floor_share);
    }

    #[test]
    fn stale_groups_are_pinned_to_zero_and_excluded() {
        let mut inputs = inputs(&[("a", 10), ("b", 10), ("c", 10)]);
        inputs[1].stale = true;
        let result = rebalance(&inputs, 40);
        assert_eq!(result[1], 0);
        assert_eq!(result[0] + result[2], 40);
    }
}
