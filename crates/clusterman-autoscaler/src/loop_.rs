//! §5: the autoscaling loop. Ties a primary `SignalSource` (falling
//! back to a default signal on failure), a `PoolManager`, and a
//! `ClusterManagerClient` together into one tick, then drives that
//! tick on an interval until told to shut down.

use std::sync::Arc;
use std::time::Duration;

use clusterman_core::{AutoscalingConfig, ResourceRequest};
use clusterman_pool::{ClusterManagerClient, PoolManager};
use tracing::{error, info, warn};

use crate::compute::{compute_target_capacity, PoolCapacitySnapshot};
use crate::error::{AutoscalerError, AutoscalerResult};
use crate::health::HealthCheckSink;
use crate::signal_source::SignalSource;

pub struct Autoscaler<C: ClusterManagerClient> {
    cluster: String,
    pool_name: String,
    config: AutoscalingConfig,
    primary_signal: Box<dyn SignalSource>,
    default_signal: Box<dyn SignalSource>,
    health: Arc<dyn HealthCheckSink>,
    pool: PoolManager,
    cluster_client: C,
}

impl<C: ClusterManagerClient> Autoscaler<C> {
    pub fn new(
        cluster: impl Into<String>,
        pool_name: impl Into<String>,
        config: AutoscalingConfig,
        primary_signal: Box<dyn SignalSource>,
        default_signal: Box<dyn SignalSource>,
        health: Arc<dyn HealthCheckSink>,
        pool: PoolManager,
        cluster_client: C,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            pool_name: pool_name.into(),
            config,
            primary_signal,
            default_signal,
            health,
            pool,
            cluster_client,
        }
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    /// §4.4/§5: evaluate the primary signal, falling back to the
    /// default signal (and alerting exactly once) if it fails; a
    /// failure of the default signal itself is fatal for the tick.
    async fn resolve_request(&mut self, now_unix: i64) -> AutoscalerResult<ResourceRequest> {
        match self.primary_signal.evaluate(now_unix).await {
            Ok(request) => Ok(request),
            Err(err) => {
                warn!(
                    cluster = %self.cluster,
                    pool = %self.pool_name,
                    signal = self.primary_signal.name(),
                    error = %err,
                    "primary signal failed, falling back to default signal"
                );
                self.health.alert(
                    &format!("clusterman.signal.{}.{}", self.cluster, self.pool_name),
                    &format!("signal {} failed: {err}; falling back to default", self.primary_signal.name()),
                );
                self.default_signal.evaluate(now_unix).await.map_err(|source| AutoscalerError::DefaultSignalFailed {
                    name: self.default_signal.name().to_string(),
                    source,
                })
            }
        }
    }

    /// One tick: resolve a request, compute a new target, and hand it
    /// to the pool manager. Returns the capacity actually achieved.
    pub async fn tick(&mut self, now_unix: i64, dry_run: bool) -> AutoscalerResult<u64> {
        let request = self.resolve_request(now_unix).await?;

        let snapshot = PoolCapacitySnapshot {
            current_target: self.pool.target_capacity(),
            non_orphan_fulfilled_capacity: self.pool.non_orphan_fulfilled_capacity(&self.cluster_client),
            resource_total: self.pool.get_resource_total(self.config.cpus_per_weight),
        };
        let new_target = compute_target_capacity(&request, snapshot, &self.config);

        info!(cluster = %self.cluster, pool = %self.pool_name, new_target, dry_run, "applying new target capacity");
        let achieved = self.pool.modify_target_capacity(new_target, dry_run, &self.cluster_client).await?;
        Ok(achieved)
    }

    /// Drive `tick` on `interval` until `shutdown` fires, in the style
    /// of a plain interval-and-watch-channel run loop. A failed tick is
    /// logged and does not stop the loop — the scheduler guarantees the
    /// next tick runs no sooner than this one returns (§5), not that a
    /// bad tick ends the process. Returns `true` if any tick failed
    /// with [`AutoscalerError::DefaultSignalFailed`], the one failure
    /// §7/§6 calls out as a reason for the process to exit non-zero;
    /// `clustermand` checks this once `run` returns after shutdown.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        now: impl Fn() -> i64,
        dry_run: bool,
    ) -> bool {
        info!(interval_secs = interval.as_secs(), dry_run, "autoscaler started");
        let mut default_signal_failed = false;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = self.tick(now(), dry_run).await {
                        if matches!(err, AutoscalerError::DefaultSignalFailed { .. }) {
                            default_signal_failed = true;
                        }
                        error!(cluster = %self.cluster, pool = %self.pool_name, error = %err, "autoscaler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(cluster = %self.cluster, pool = %self.pool_name, "autoscaler shutting down");
                    break;
                }
            }
        }
        default_signal_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::RecordingHealthCheckSink;
    use crate::signal_source::StaticSignalSource;
    use clusterman_core::PoolConfig;
    use clusterman_pool::StaticClusterManagerClient;
    use clusterman_resource_groups::{testutil::FakeResourceGroup, GroupKind, ResourceGroup};

    fn autoscaling_config() -> AutoscalingConfig {
        AutoscalingConfig {
            setpoint: 0.7,
            setpoint_margin: 0.0,
            cpus_per_weight: 1,
        }
    }

    fn pool_config() -> PoolConfig {
        PoolConfig {
            min_capacity: 1,
            max_capacity: 1000,
            max_weight_to_add: 1000,
            max_weight_to_remove: 1000,
        }
    }

    fn groups() -> Vec<Box<dyn ResourceGroup>> {
        vec![Box::new(FakeResourceGroup::new("a", GroupKind::AutoScaling).with_target(10))]
    }

    #[tokio::test]
    async fn falls_back_to_default_signal_and_alerts_once() {
        let health = Arc::new(RecordingHealthCheckSink::new());
        let primary = Box::new(StaticSignalSource::always_failing("primary"));
        let default = Box::new(StaticSignalSource::always_returning("default", ResourceRequest {
            cpus: Some(7.0),
            ..Default::default()
        }));
        let pool = PoolManager::new("cluster1", "pool1", pool_config(), groups());
        let mut autoscaler = Autoscaler::new(
            "cluster1",
            "pool1",
            autoscaling_config(),
            primary,
            default,
            health.clone(),
            pool,
            StaticClusterManagerClient::new(Vec::new()),
        );

        let result = autoscaler.tick(0, true).await;
        assert!(result.is_ok());
        assert_eq!(health.alerts().len(), 1, "exactly one alert for the primary signal failure");
    }

    #[tokio::test]
    async fn default_signal_failure_is_fatal_for_the_tick() {
        let health = Arc::new(RecordingHealthCheckSink::new());
        let primary = Box::new(StaticSignalSource::always_failing("primary"));
        let default = Box::new(StaticSignalSource::always_failing("default"));
        let pool = PoolManager::new("cluster1", "pool1", pool_config(), groups());
        let mut autoscaler = Autoscaler::new(
            "cluster1",
            "pool1",
            autoscaling_config(),
            primary,
            default,
            health,
            pool,
            StaticClusterManagerClient::new(Vec::new()),
        );

        let result = autoscaler.tick(0, true).await;
        assert!(matches!(result, Err(AutoscalerError::DefaultSignalFailed { .. })));
    }

    #[tokio::test]
    async fn healthy_primary_signal_never_touches_the_health_sink() {
        let health = Arc::new(RecordingHealthCheckSink::new());
        let primary = Box::new(StaticSignalSource::always_returning("primary", ResourceRequest {
            cpus: Some(7.0),
            ..Default::default()
        }));
        let default = Box::new(StaticSignalSource::always_failing("default"));
        let pool = PoolManager::new("cluster1", "pool1", pool_config(), groups());
        let mut autoscaler = Autoscaler::new(
            "cluster1",
            "pool1",
            autoscaling_config(),
            primary,
            default,
            health.clone(),
            pool,
            StaticClusterManagerClient::new(Vec::new()),
        );

        let result = autoscaler.tick(0, true).await;
        assert!(result.is_ok());
        assert!(health.alerts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_a_default_signal_failure_once_shutdown() {
        let health = Arc::new(RecordingHealthCheckSink::new());
        let primary = Box::new(StaticSignalSource::always_failing("primary"));
        let default = Box::new(StaticSignalSource::always_failing("default"));
        let pool = PoolManager::new("cluster1", "pool1", pool_config(), groups());
        let mut autoscaler = Autoscaler::new(
            "cluster1",
            "pool1",
            autoscaling_config(),
            primary,
            default,
            health,
            pool,
            StaticClusterManagerClient::new(Vec::new()),
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { autoscaler.run(Duration::from_secs(1), shutdown_rx, || 0, true).await });

        tokio::time::advance(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        let default_signal_failed = handle.await.unwrap();
        assert!(default_signal_failed, "a default-signal tick failure should be reported once the loop stops");
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_no_failure_when_every_tick_succeeds() {
        let health = Arc::new(RecordingHealthCheckSink::new());
        let primary = Box::new(StaticSignalSource::always_returning("primary", ResourceRequest {
            cpus: Some(7.0),
            ..Default::default()
        }));
        let default = Box::new(StaticSignalSource::always_failing("default"));
        let pool = PoolManager::new("cluster1", "pool1", pool_config(), groups());
        let mut autoscaler = Autoscaler::new(
            "cluster1",
            "pool1",
            autoscaling_config(),
            primary,
            default,
            health,
            pool,
            StaticClusterManagerClient::new(Vec::new()),
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { autoscaler.run(Duration::from_secs(1), shutdown_rx, || 0, true).await });

        tokio::time::advance(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        let default_signal_failed = handle.await.unwrap();
        assert!(!default_signal_failed, "the default signal never had to run, so there is nothing to report");
    }
}
