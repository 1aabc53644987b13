//! Per-group provider failures.

use thiserror::Error;

pub type ResourceGroupResult<T> = Result<T, ResourceGroupError>;

/// A provider failure scoped to a single resource group. Callers
/// (the pool manager) log and skip the group rather than abort the
/// whole tick.
#[derive(Debug, Error)]
pub enum ResourceGroupError {
    #[error("provider call failed for group {group_id}: {source}")]
    Provider {
        group_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("group {group_id} has no launch configuration")]
    MissingLaunchConfig { group_id: String },

    #[error("discovery failed: {0}")]
    Discovery(#[source] anyhow::Error),
}
