//! Static dispatch table for backend discovery (§6's "resource-group
//! discovery contract"), keyed by configured type string rather than
//! any runtime class lookup.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_autoscaling::Client as AutoScalingClient;
use aws_sdk_ec2::Client as Ec2Client;
use serde::Deserialize;

use crate::auto_scaling::AutoScalingResourceGroup;
use crate::error::ResourceGroupResult;
use crate::group::{GroupKind, ResourceGroup};

/// One entry in a pool's `resource_groups` config list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Sfr { tag: String },
    Asg { tag: String, cache_ttl_seconds: u64 },
}

/// Discover every resource group belonging to `(cluster, pool)` across
/// all configured backends, merged into one id-keyed map.
pub async fn load_all(
    cluster: &str,
    pool: &str,
    backends: &[BackendConfig],
    autoscaling_client: &AutoScalingClient,
    ec2_client: &Ec2Client,
) -> ResourceGroupResult<HashMap<String, Box<dyn ResourceGroup>>> {
    let mut groups: HashMap<String, Box<dyn ResourceGroup>> = HashMap::new();
    for backend in backends {
        match backend {
            BackendConfig::Sfr { tag } => {
                for (id, group) in crate::spot_fleet::load(cluster, pool, tag, ec2_client).await? {
                    groups.insert(id, Box::new(group) as Box<dyn ResourceGroup>);
                }
            }
            BackendConfig::Asg { tag, cache_ttl_seconds } => {
                for (id, group) in
                    load_asgs(cluster, pool, tag, autoscaling_client, ec2_client, Duration::from_secs(*cache_ttl_seconds)).await?
                {
                    groups.insert(id, Box::new(group) as Box<dyn ResourceGroup>);
                }
            }
        }
    }
    Ok(groups)
}

async fn load_asgs(
    cluster: &str,
    pool: &str,
    tag_key: &str,
    client: &AutoScalingClient,
    ec2_client: &Ec2Client,
    cache_ttl: Duration,
) -> ResourceGroupResult<HashMap<String, AutoScalingResourceGroup>> {
    #[derive(Deserialize)]
    struct RoleTag {
        pool: String,
        paasta_cluster: String,
    }

    let mut out = HashMap::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut req = client.describe_auto_scaling_groups();
        if let Some(token) = &next_token {
            req = req.next_token(token);
        }
        let resp = req.send().await.map_err(|e| crate::error::ResourceGroupError::Discovery(e.into()))?;
        for asg in resp.auto_scaling_groups() {
            let Some(name) = asg.auto_scaling_group_name() else { continue };
            let Some(tag) = asg.tags().iter().find(|t| t.key() == Some(tag_key)) else {
                continue;
            };
            let Some(value) = tag.value() else { continue };
            let Ok(parsed) = serde_json::from_str::<RoleTag>(value) else {
                continue;
            };
            if parsed.pool == pool && parsed.paasta_cluster == cluster {
                let group = AutoScalingResourceGroup::load(name, client.clone(), ec2_client.clone(), cache_ttl).await?;
                out.insert(name.to_string(), group);
            }
        }
        next_token = resp.next_token().map(str::to_string);
        if next_token.is_none() {
            break;
        }
    }
    Ok(out)
}

impl From<BackendConfig> for GroupKind {
    fn from(cfg: BackendConfig) -> Self {
        match cfg {
            BackendConfig::Sfr { .. } => GroupKind::SpotFleet,
            BackendConfig::Asg { .. } => GroupKind::AutoScaling,
        }
    }
}
