//! `Signal`: owns the worker subprocess and its socket for one
//! (namespace, signal_name) pair, and drives one evaluation per tick
//! (§4.3's "Per evaluation" sequence).

use std::sync::Arc;

use serde::Deserialize;
use tokio::net::UnixStream;
use tokio::process::Child;

use clusterman_core::{MetricSpec, ResourceRequest, SignalConfig};
use clusterman_metrics::{qualify_metric_key, MetricsClient};

use crate::error::{SignalError, SignalResult};
use crate::launch::{self, ControlSocket};
use crate::protocol;
use crate::repo;

/// A running signal worker: subprocess + its one accepted connection.
pub struct Signal {
    name: String,
    cluster: String,
    pool: String,
    config: SignalConfig,
    metrics_client: Arc<dyn MetricsClient>,
    child: Child,
    stream: UnixStream,
}

impl Signal {
    /// Build the signal's repository, launch the worker, and complete
    /// the handshake (§4.3 steps 1-5).
    pub async fn start(
        cluster: impl Into<String>,
        pool: impl Into<String>,
        app: Option<&str>,
        namespace: &str,
        config: SignalConfig,
        metrics_client: Arc<dyn MetricsClient>,
    ) -> SignalResult<Self> {
        let cluster = cluster.into();
        let pool = pool.into();

        let signal_dir = repo::ensure_local_signal_directory(&config.branch_or_tag).await?;
        let socket = ControlSocket::bind(namespace, &config.name)?;
        let child = launch::spawn_worker(&signal_dir, namespace, &config.name).await?;
        let mut stream = socket.accept_one().await?;

        let init = serde_json::json!({
            "cluster": cluster,
            "pool": pool,
            "app": app,
            "parameters": config.parameters,
        });
        launch::send_init_frame(&mut stream, &init).await?;

        Ok(Self {
            name: config.name.clone(),
            cluster,
            pool,
            config,
            metrics_client,
            child,
            stream,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period_minutes(&self) -> u32 {
        self.config.period_minutes
    }

    /// Run one evaluation: build metrics, send them over the wire,
    /// and parse the signal's `Resources` response (§4.3 "Per
    /// evaluation").
    pub async fn evaluate(&mut self, now_unix: i64) -> SignalResult<ResourceRequest> {
        let metrics = self.build_metrics(now_unix).await?;
        let payload = serde_json::json!({ "metrics": metrics, "timestamp": now_unix });
        let bytes = serde_json::to_vec(&payload).map_err(|e| SignalError::Unexpected(e.into()))?;

        // Send the length, wait for the signal to ack it, then send
        // the body — the worker acks the length on its own before the
        // body arrives (§4.3 steps 3-4).
        protocol::write_length_prefix(&mut self.stream, bytes.len() as u32).await?;
        protocol::read_ack(&mut self.stream).await?;
        protocol::write_body(&mut self.stream, &bytes).await?;

        let response = protocol::read_ack_and_frame(&mut self.stream).await?;
        let wrapper: ResourcesWrapper = serde_json::from_slice(&response).map_err(|e| SignalError::Connection(format!("invalid response JSON: {e}")))?;
        Ok(wrapper.resources)
    }

    async fn build_metrics(&self, now_unix: i64) -> SignalResult<std::collections::HashMap<String, Vec<(i64, f64)>>> {
        let mut metrics = std::collections::HashMap::new();
        for spec in &self.config.required_metrics {
            let series = self.fetch_one(spec, now_unix).await?;
            metrics.insert(spec.name.clone(), series);
        }
        Ok(metrics)
    }

    async fn fetch_one(&self, spec: &MetricSpec, now_unix: i64) -> SignalResult<Vec<(i64, f64)>> {
        let key = qualify_metric_key(&spec.name, spec.kind, &self.cluster, &self.pool);
        let start = now_unix - spec.minute_range as i64 * 60;
        self.metrics_client
            .get_metric_values(&key, spec.kind, start, now_unix)
            .await
            .map_err(|e| SignalError::Unexpected(e.into()))
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.start_kill();
        }
    }
}

#[derive(Deserialize)]
struct ResourcesWrapper {
    #[serde(rename = "Resources")]
    resources: ResourceRequest,
}
