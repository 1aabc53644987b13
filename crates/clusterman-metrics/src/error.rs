//! Errors from the metrics-store client and metrics-index expansion.

use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics query failed for key {key}: {source}")]
    Query {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch metrics index: {0}")]
    IndexFetch(#[source] anyhow::Error),

    #[error("failed to parse metrics index: {0}")]
    IndexParse(#[source] anyhow::Error),

    #[error("invalid metric name pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
