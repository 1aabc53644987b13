//! `clustermand.toml` configuration, decoded the way
//! `warp-core::config::WarpConfig::from_file` decodes `warp.toml`:
//! plain `serde`-derived structs, no custom decode logic.

use std::path::Path;

use clusterman_core::{AutoscalingConfig, PoolConfig, SignalConfig};
use clusterman_resource_groups::registry::BackendConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub aws_region: String,
    pub cluster_manager_url: String,
    pub metrics_store_url: String,
    pub metrics_index_bucket: String,
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    pub cluster: String,
    pub pool: String,
    pub namespace: String,
    pub capacity: PoolConfig,
    pub autoscaling: AutoscalingConfig,
    pub resource_groups: Vec<BackendConfig>,
    pub signal: SignalConfig,
    pub default_signal: SignalConfig,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_minimal_config() {
        let toml_str = r#"
            aws_region = "us-west-2"
            cluster_manager_url = "http://cluster-manager.internal"
            metrics_store_url = "http://metrics.internal"
            metrics_index_bucket = "clusterman-metrics-index"

            [pool]
            cluster = "mesos-prod"
            pool = "default"
            namespace = "mesos-prod.default"

            [pool.capacity]
            min_capacity = 10
            max_capacity = 1000
            max_weight_to_add = 100
            max_weight_to_remove = 100

            [pool.autoscaling]
            setpoint = 0.7
            setpoint_margin = 0.1
            cpus_per_weight = 1

            [[pool.resource_groups]]
            type = "asg"
            tag = "paasta"
            cache_ttl_seconds = 300

            [pool.signal]
            name = "app_signal"
            branch_or_tag = "v1.0"
            period_minutes = 5

            [pool.default_signal]
            name = "default"
            branch_or_tag = "v1.0"
            period_minutes = 5
        "#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pool.cluster, "mesos-prod");
        assert_eq!(config.pool.resource_groups.len(), 1);
        assert_eq!(config.pool.autoscaling.setpoint, 0.7);
    }
}
