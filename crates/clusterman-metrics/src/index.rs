//! The metrics-index file (§6): an S3 object `<region>.yaml` mapping
//! metric-type to a list of concrete metric names, used to expand a
//! regex `MetricSpec::name` into one `MetricSpec` per matching
//! concrete name.

use clusterman_core::{MetricSpec, MetricType};
use regex::Regex;

use crate::error::{MetricsError, MetricsResult};

/// Metric-type -> list of concrete metric names, as published by the
/// out-of-scope metrics-index publisher.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MetricsIndex {
    #[serde(default)]
    system: Vec<String>,
    #[serde(default)]
    app: Vec<String>,
}

impl MetricsIndex {
    fn names_for(&self, kind: MetricType) -> &[String] {
        match kind {
            MetricType::System => &self.system,
            MetricType::App => &self.app,
        }
    }
}

/// Fetch and parse `<region>.yaml` from the metrics-index bucket.
pub async fn fetch_metrics_index(s3: &aws_sdk_s3::Client, bucket: &str, region: &str) -> MetricsResult<MetricsIndex> {
    let key = format!("{region}.yaml");
    let resp = s3.get_object().bucket(bucket).key(&key).send().await.map_err(|e| MetricsError::IndexFetch(e.into()))?;
    let bytes = resp.body.collect().await.map_err(|e| MetricsError::IndexFetch(e.into()))?.into_bytes();
    serde_yaml::from_slice(&bytes).map_err(|e| MetricsError::IndexParse(e.into()))
}

/// Expand each spec's `name` (treated as a regex) against the indexed
/// names for its type, producing one concrete `MetricSpec` per match.
/// A direct port of `update_metrics_dict_list` from the original
/// implementation.
pub fn expand_metric_specs(specs: &[MetricSpec], index: &MetricsIndex) -> MetricsResult<Vec<MetricSpec>> {
    let mut expanded = Vec::new();
    for spec in specs {
        let re = Regex::new(&format!("^{}$", spec.name)).map_err(|e| MetricsError::InvalidPattern {
            pattern: spec.name.clone(),
            source: e,
        })?;
        for name in index.names_for(spec.kind) {
            if re.is_match(name) {
                expanded.push(MetricSpec {
                    name: name.clone(),
                    kind: spec.kind,
                    minute_range: spec.minute_range,
                });
            }
        }
    }
    Ok(expanded)
}

/// Build an index directly from pre-fetched name lists, for tests and
/// simulation harnesses that don't want to talk to S3.
pub fn static_index(system: Vec<String>, app: Vec<String>) -> MetricsIndex {
    MetricsIndex { system, app }
}
