//! Auto-scaling-group backed resource group.
//!
//! All member instances are kept scale-in protected at all times so
//! the cluster manager stays the authority on terminations; protection
//! is removed from exactly the first N instances right before a
//! scale-down lowers desired capacity.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use aws_sdk_autoscaling::Client as AutoScalingClient;
use clusterman_core::Market;

use crate::error::{ResourceGroupError, ResourceGroupResult};
use crate::group::{filter_owned_ids, BoxFuture, GroupKind, GroupStatus, ResourceGroup};

/// Explicit per-property cache entry with an absolute expiry — the
/// Rust-native replacement for `@timed_cached_property`.
struct Cached<T> {
    value: Option<T>,
    expires_at: Instant,
}

impl<T> Cached<T> {
    fn empty() -> Self {
        Self {
            value: None,
            expires_at: Instant::now(),
        }
    }

    fn get(&self) -> Option<&T> {
        if Instant::now() < self.expires_at {
            self.value.as_ref()
        } else {
            None
        }
    }

    fn set(&mut self, value: T, ttl: Duration) {
        self.value = Some(value);
        self.expires_at = Instant::now() + ttl;
    }
}

struct GroupDescription {
    availability_zones: Vec<String>,
    max_size: u64,
    min_size: u64,
    desired_capacity: u64,
    instance_ids: Vec<String>,
    /// Each member instance's actual placement, keyed by instance id —
    /// `market_capacities` aggregates by this rather than spreading
    /// weight evenly across `availability_zones`.
    instance_azs: HashMap<String, String>,
    launch_configuration_name: Option<String>,
    launch_template_id: Option<String>,
}

pub struct AutoScalingResourceGroup {
    group_id: String,
    client: AutoScalingClient,
    ec2_client: aws_sdk_ec2::Client,
    cache_ttl: Duration,
    description: RwLock<Cached<GroupDescription>>,
    /// Cached separately from `description`: the instance type a
    /// launch configuration or launch template resolves to. Per-entry
    /// TTL, keyed implicitly by whichever config/template name is
    /// current — a stale entry just gets re-resolved on the next miss.
    launch_instance_type: RwLock<Cached<String>>,
}

impl AutoScalingResourceGroup {
    pub async fn load(
        group_id: impl Into<String>,
        client: AutoScalingClient,
        ec2_client: aws_sdk_ec2::Client,
        cache_ttl: Duration,
    ) -> ResourceGroupResult<Self> {
        let group_id = group_id.into();
        let group = Self {
            group_id: group_id.clone(),
            client,
            ec2_client,
            cache_ttl,
            description: RwLock::new(Cached::empty()),
            launch_instance_type: RwLock::new(Cached::empty()),
        };
        group.refresh_group_description().await?;
        group.resolve_launch_instance_type().await?;
        group.protect_instances(true).await?;
        Ok(group)
    }

    async fn refresh_group_description(&self) -> ResourceGroupResult<()> {
        if self.description.read().unwrap().get().is_some() {
            return Ok(());
        }
        let resp = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(&self.group_id)
            .send()
            .await
            .map_err(|e| ResourceGroupError::Provider {
                group_id: self.group_id.clone(),
                source: e.into(),
            })?;
        let asg = resp
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| ResourceGroupError::Provider {
                group_id: self.group_id.clone(),
                source: anyhow::anyhow!("describe_auto_scaling_groups returned no groups"),
            })?;
        let mut instance_azs = HashMap::new();
        let instance_ids: Vec<String> = asg
            .instances()
            .iter()
            .filter_map(|i| {
                let id = i.instance_id()?;
                if let Some(az) = i.availability_zone() {
                    instance_azs.insert(id.to_string(), az.to_string());
                }
                Some(id.to_string())
            })
            .collect();
        let description = GroupDescription {
            availability_zones: asg.availability_zones().iter().map(String::from).collect(),
            max_size: asg.max_size() as u64,
            min_size: asg.min_size() as u64,
            desired_capacity: asg.desired_capacity() as u64,
            instance_ids,
            instance_azs,
            launch_configuration_name: asg.launch_configuration_name().map(String::from),
            launch_template_id: asg
                .launch_template()
                .and_then(|lt| lt.launch_template_id())
                .map(String::from)
                .or_else(|| asg.mixed_instances_policy().and_then(|p| p.launch_template()).and_then(|t| t.launch_template_specification()).and_then(|s| s.launch_template_id()).map(String::from)),
        };
        self.description.write().unwrap().set(description, self.cache_ttl);
        Ok(())
    }

    /// Resolve the group's launch configuration or launch template to
    /// a concrete instance type, via whichever the ASG actually uses.
    async fn resolve_launch_instance_type(&self) -> ResourceGroupResult<()> {
        if self.launch_instance_type.read().unwrap().get().is_some() {
            return Ok(());
        }
        let (config_name, template_id) = {
            let guard = self.description.read().unwrap();
            let desc = guard.get().ok_or_else(|| ResourceGroupError::MissingLaunchConfig {
                group_id: self.group_id.clone(),
            })?;
            (desc.launch_configuration_name.clone(), desc.launch_template_id.clone())
        };

        let instance_type = if let Some(name) = config_name {
            let resp = self
                .client
                .describe_launch_configurations()
                .launch_configuration_names(&name)
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.group_id.clone(),
                    source: e.into(),
                })?;
            resp.launch_configurations()
                .first()
                .and_then(|c| c.instance_type())
                .map(String::from)
        } else if let Some(id) = template_id {
            let resp = self
                .ec2_client
                .describe_launch_template_versions()
                .launch_template_id(&id)
                .versions("$Latest")
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.group_id.clone(),
                    source: e.into(),
                })?;
            resp.launch_template_versions()
                .first()
                .and_then(|v| v.launch_template_data())
                .and_then(|d| d.instance_type())
                .map(|t| t.as_str().to_string())
        } else {
            None
        };

        let instance_type = instance_type.ok_or_else(|| ResourceGroupError::MissingLaunchConfig {
            group_id: self.group_id.clone(),
        })?;
        self.launch_instance_type.write().unwrap().set(instance_type, self.cache_ttl);
        Ok(())
    }

    fn resolved_instance_type(&self) -> String {
        self.launch_instance_type.read().unwrap().get().cloned().unwrap_or_default()
    }

    async fn protect_instances(&self, protect: bool) -> ResourceGroupResult<()> {
        self.client
            .update_auto_scaling_group()
            .auto_scaling_group_name(&self.group_id)
            .new_instances_protected_from_scale_in(protect)
            .send()
            .await
            .map_err(|e| ResourceGroupError::Provider {
                group_id: self.group_id.clone(),
                source: e.into(),
            })?;

        let ids = self.instance_ids();
        if !ids.is_empty() {
            self.client
                .set_instance_protection()
                .set_instance_ids(Some(ids))
                .auto_scaling_group_name(&self.group_id)
                .protected_from_scale_in(protect)
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.group_id.clone(),
                    source: e.into(),
                })?;
        }
        Ok(())
    }
}

impl ResourceGroup for AutoScalingResourceGroup {
    fn id(&self) -> &str {
        &self.group_id
    }

    fn kind(&self) -> GroupKind {
        GroupKind::AutoScaling
    }

    fn status(&self) -> GroupStatus {
        GroupStatus::Active
    }

    fn is_stale(&self) -> bool {
        false
    }

    fn target_capacity(&self) -> u64 {
        self.description.read().unwrap().get().map(|d| d.desired_capacity).unwrap_or(0)
    }

    fn fulfilled_capacity(&self) -> u64 {
        self.description.read().unwrap().get().map(|d| d.instance_ids.len() as u64).unwrap_or(0)
    }

    fn instance_ids(&self) -> Vec<String> {
        self.description.read().unwrap().get().map(|d| d.instance_ids.clone()).unwrap_or_default()
    }

    fn market_weight(&self, market: &Market) -> u64 {
        let guard = self.description.read().unwrap();
        let Some(desc) = guard.get() else { return 0 };
        if desc.availability_zones.iter().any(|az| az == &market.availability_zone) && market.instance_type == self.resolved_instance_type() {
            market.cpu_count().unwrap_or(0) as u64
        } else {
            0
        }
    }

    fn market_capacities(&self) -> HashMap<Market, u64> {
        let guard = self.description.read().unwrap();
        let Some(desc) = guard.get() else { return HashMap::new() };
        let instance_type = self.resolved_instance_type();
        let mut out: HashMap<Market, u64> = HashMap::new();
        for id in &desc.instance_ids {
            let Some(az) = desc.instance_azs.get(id) else { continue };
            let market = Market::new(instance_type.clone(), az.clone());
            let weight = self.market_weight(&market);
            *out.entry(market).or_insert(0) += weight;
        }
        out
    }

    fn modify_target_capacity<'a>(
        &'a self,
        mut new_target: u64,
        terminate_excess_capacity: bool,
        dry_run: bool,
    ) -> BoxFuture<'a, ResourceGroupResult<()>> {
        Box::pin(async move {
            self.refresh_group_description().await?;
            let (max_size, min_size, current) = {
                let guard = self.description.read().unwrap();
                let desc = guard.get().expect("just refreshed");
                (desc.max_size, desc.min_size, desc.desired_capacity)
            };

            if new_target > max_size {
                tracing::warn!(group_id = %self.group_id, new_target, max_size, "new target exceeds ASG MaxSize, clamping to max");
                new_target = max_size;
            } else if new_target < min_size {
                tracing::warn!(group_id = %self.group_id, new_target, min_size, "new target falls below ASG MinSize, clamping to min");
                new_target = min_size;
            }

            tracing::info!(group_id = %self.group_id, new_target, dry_run, "setting ASG desired capacity");
            if dry_run {
                return Ok(());
            }

            let target_diff = current.saturating_sub(new_target);
            if target_diff > 0 && terminate_excess_capacity {
                let ids = self.instance_ids();
                let unprotect: Vec<String> = ids.into_iter().take(target_diff as usize).collect();
                if !unprotect.is_empty() {
                    self.client
                        .set_instance_protection()
                        .set_instance_ids(Some(unprotect))
                        .auto_scaling_group_name(&self.group_id)
                        .protected_from_scale_in(false)
                        .send()
                        .await
                        .map_err(|e| ResourceGroupError::Provider {
                            group_id: self.group_id.clone(),
                            source: e.into(),
                        })?;
                }
            }

            self.client
                .set_desired_capacity()
                .auto_scaling_group_name(&self.group_id)
                .desired_capacity(new_target as i32)
                .honor_cooldown(false)
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.group_id.clone(),
                    source: e.into(),
                })?;

            if let Some(desc) = self.description.write().unwrap().value.as_mut() {
                desc.desired_capacity = new_target;
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
            let owned = filter_owned_ids(self, &ids);
            if owned.is_empty() {
                tracing::warn!(group_id = %self.group_id, "no instances to terminate");
                return Ok(Vec::new());
            }
            if dry_run {
                return Ok(owned);
            }

            // The autoscaling client only terminates one instance at a
            // time; use EC2 for batch termination to avoid hitting
            // request limits. The cluster manager remains the source of
            // truth for when termination is safe, not the ASG's own
            // termination hooks.
            let mut terminated = Vec::new();
            let resp = self
                .ec2_client
                .terminate_instances()
                .set_instance_ids(Some(owned.clone()))
                .send()
                .await
                .map_err(|e| ResourceGroupError::Provider {
                    group_id: self.group_id.clone(),
                    source: e.into(),
                })?;
            for inst in resp.terminating_instances() {
                if let Some(id) = inst.instance_id() {
                    terminated.push(id.to_string());
                }
            }

            let missing: Vec<&String> = owned.iter().filter(|id| !terminated.contains(id)).collect();
            if !missing.is_empty() {
                tracing::warn!(group_id = %self.group_id, ?missing, "some instances could not be terminated; probably killed previously");
            }

            if let Some(desc) = self.description.write().unwrap().value.as_mut() {
                desc.instance_ids.retain(|id| !terminated.contains(id));
            }
            tracing::info!(group_id = %self.group_id, ?terminated, "terminated ASG instances");
            Ok(terminated)
        })
    }
}
