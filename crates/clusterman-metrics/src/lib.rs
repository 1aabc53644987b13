//! The metrics-store client (§6) and metrics-index expansion: the
//! signal driver's only two points of contact with the metrics
//! system, kept in their own crate so `clusterman-signal` doesn't
//! need to know about S3 or the HTTP metrics store directly.

pub mod client;
pub mod error;
pub mod index;

pub use client::{qualify_metric_key, HttpMetricsClient, MetricSeries, MetricsClient, StaticMetricsClient};
pub use error::{MetricsError, MetricsResult};
pub use index::{expand_metric_specs, fetch_metrics_index, static_index, MetricsIndex};
