//! Configuration structs decoded from TOML at startup.
//!
//! Styled after `warp-core::config::WarpConfig`: plain `serde`-derived
//! structs, no custom decode logic beyond what `ResourceRequest`
//! already needs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-pool capacity bounds and churn caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub min_capacity: u64,
    pub max_capacity: u64,
    pub max_weight_to_add: u64,
    pub max_weight_to_remove: u64,
}

impl PoolConfig {
    /// Clamp a desired pool-wide target into `[min_capacity, max_capacity]`.
    pub fn clamp(&self, desired: u64) -> u64 {
        desired.clamp(self.min_capacity, self.max_capacity)
    }
}

/// Setpoint/margin policy for the autoscaling control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    /// Target utilization, in (0, 1).
    pub setpoint: f64,
    /// Hysteresis band, in [0, 1].
    pub setpoint_margin: f64,
    /// Legacy CPU-per-weight-unit conversion factor.
    pub cpus_per_weight: u32,
}

/// The type of a metric, which determines how its key is qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Qualified by the (cluster, pool) dimensions.
    System,
    /// Used verbatim.
    App,
}

/// One metric a signal wants fetched before each evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricType,
    pub minute_range: u32,
}

/// Configuration for one signal: where to fetch it, how often to run
/// it, and what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    pub branch_or_tag: String,
    pub period_minutes: u32,
    #[serde(default)]
    pub required_metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl SignalConfig {
    pub fn run_frequency_secs(&self) -> u64 {
        self.period_minutes as u64 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_clamps_desired_into_bounds() {
        let cfg = PoolConfig {
            min_capacity: 5,
            max_capacity: 100,
            max_weight_to_add: 50,
            max_weight_to_remove: 50,
        };
        assert_eq!(cfg.clamp(3), 5);
        assert_eq!(cfg.clamp(200), 100);
        assert_eq!(cfg.clamp(42), 42);
    }

    #[test]
    fn run_frequency_converts_minutes_to_seconds() {
        let cfg = SignalConfig {
            name: "test".into(),
            branch_or_tag: "main".into(),
            period_minutes: 5,
            required_metrics: vec![],
            parameters: HashMap::new(),
        };
        assert_eq!(cfg.run_frequency_secs(), 300);
    }

    #[test]
    fn signal_config_round_trips_through_toml() {
        let cfg = SignalConfig {
            name: "app_signal".into(),
            branch_or_tag: "v3".into(),
            period_minutes: 10,
            required_metrics: vec![MetricSpec {
                name: "cpus_allocated".into(),
                kind: MetricType::System,
                minute_range: 30,
            }],
            parameters: HashMap::new(),
        };
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let decoded: SignalConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg, decoded);
    }
}
