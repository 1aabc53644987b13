//! The metrics-store client contract (§6): `get_metric_values(key, type,
//! start, end) -> (metadata, [(ts, value)])` in the original; the core
//! only ever consumes the second element, so the trait here returns
//! the timeseries directly.

use clusterman_core::MetricType;

use crate::error::{MetricsError, MetricsResult};

/// One (timestamp, value) sample, `ts` in Unix seconds.
pub type MetricSeries = Vec<(i64, f64)>;

/// A source of metric timeseries data. Implemented once against a
/// real metrics store (`HttpMetricsClient`) and once as an in-memory
/// double for tests and simulation harnesses (`StaticMetricsClient`).
#[async_trait::async_trait]
pub trait MetricsClient: Send + Sync {
    async fn get_metric_values(&self, key: &str, kind: MetricType, start_unix: i64, end_unix: i64) -> MetricsResult<MetricSeries>;
}

/// An in-memory metrics client for tests and simulation harnesses: a
/// fixed map of key -> full series, sliced to the requested window.
#[derive(Debug, Default, Clone)]
pub struct StaticMetricsClient {
    series: std::collections::HashMap<String, MetricSeries>,
}

impl StaticMetricsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, key: impl Into<String>, series: MetricSeries) -> Self {
        self.series.insert(key.into(), series);
        self
    }
}

#[async_trait::async_trait]
impl MetricsClient for StaticMetricsClient {
    async fn get_metric_values(&self, key: &str, _kind: MetricType, start_unix: i64, end_unix: i64) -> MetricsResult<MetricSeries> {
        Ok(self
            .series
            .get(key)
            .map(|series| series.iter().filter(|(ts, _)| *ts >= start_unix && *ts <= end_unix).cloned().collect())
            .unwrap_or_default())
    }
}

/// A metrics client backed by an HTTP metrics store, following the
/// ecosystem-standard `reqwest` client used across the retrieved
/// pack's HTTP-facing crates for outbound calls.
pub struct HttpMetricsClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpMetricsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct MetricValuesResponse {
    values: Vec<(i64, f64)>,
}

#[async_trait::async_trait]
impl MetricsClient for HttpMetricsClient {
    async fn get_metric_values(&self, key: &str, kind: MetricType, start_unix: i64, end_unix: i64) -> MetricsResult<MetricSeries> {
        let kind_str = match kind {
            MetricType::System => "system",
            MetricType::App => "app",
        };
        let url = format!("{}/v1/metrics/{key}", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("type", kind_str), ("start", &start_unix.to_string()), ("end", &end_unix.to_string())])
            .send()
            .await
            .map_err(|e| MetricsError::Query {
                key: key.to_string(),
                source: e.into(),
            })?
            .error_for_status()
            .map_err(|e| MetricsError::Query {
                key: key.to_string(),
                source: e.into(),
            })?;
        let parsed: MetricValuesResponse = resp.json().await.map_err(|e| MetricsError::Query {
            key: key.to_string(),
            source: e.into(),
        })?;
        Ok(parsed.values)
    }
}

/// Qualify a metric key by its type: system metrics carry the
/// (cluster, pool) dimensions, app metrics are used verbatim.
pub fn qualify_metric_key(name: &str, kind: MetricType, cluster: &str, pool: &str) -> String {
    match kind {
        MetricType::System => format!("{name},cluster={cluster},pool={pool}"),
        MetricType::App => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_client_slices_to_the_requested_window() {
        let client = StaticMetricsClient::new().with_series("cpus_allocated", vec![(10, 1.0), (20, 2.0), (30, 3.0)]);
        let values = client.get_metric_values("cpus_allocated", MetricType::System, 15, 25).await.unwrap();
        assert_eq!(values, vec![(20, 2.0)]);
    }

    #[tokio::test]
    async fn static_client_returns_empty_series_for_unknown_key() {
        let client = StaticMetricsClient::new();
        let values = client.get_metric_values("missing", MetricType::App, 0, 100).await.unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn system_metrics_are_qualified_by_cluster_and_pool() {
        let key = qualify_metric_key("cpus_allocated", MetricType::System, "mesos-prod", "default");
        assert_eq!(key, "cpus_allocated,cluster=mesos-prod,pool=default");
    }

    #[test]
    fn app_metrics_are_used_verbatim() {
        let key = qualify_metric_key("my_app_metric", MetricType::App, "mesos-prod", "default");
        assert_eq!(key, "my_app_metric");
    }
}
