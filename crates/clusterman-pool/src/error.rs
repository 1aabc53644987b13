//! Pool-level error taxonomy (§7).

use thiserror::Error;

pub type PoolManagerResult<T> = Result<T, PoolManagerError>;

/// Fatal for the tick: no groups, or a pool-wide provider failure.
#[derive(Debug, Error)]
pub enum PoolManagerError {
    #[error("pool {cluster}/{pool} has no non-stale resource groups")]
    NoResourceGroups { cluster: String, pool: String },

    #[error("discovery failed for {cluster}/{pool}: {source}")]
    Discovery {
        cluster: String,
        pool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Internal-only signals raised by pruning to skip a termination
/// candidate. Never surfaced outside this crate.
#[derive(Debug, Error)]
pub(crate) enum PruneSkip {
    #[error("market {0} is protected")]
    MarketProtected(String),

    #[error("group {0} is protected")]
    ResourceGroupProtected(String),
}
