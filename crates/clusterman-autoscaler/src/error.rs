//! Autoscaler-level error taxonomy (§7): pool-level and default-signal
//! failures are fatal for the tick; everything else is handled inside
//! the loop via the default-signal fallback.

use thiserror::Error;

pub type AutoscalerResult<T> = Result<T, AutoscalerError>;

#[derive(Debug, Error)]
pub enum AutoscalerError {
    #[error("default signal {name} failed: {source}")]
    DefaultSignalFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    PoolManager(#[from] clusterman_pool::PoolManagerError),
}
