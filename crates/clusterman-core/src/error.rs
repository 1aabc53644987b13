//! Error types shared by the data model itself (config decode errors).

use thiserror::Error;

/// Result type alias for `clusterman-core` operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid resource request: {0}")]
    InvalidResourceRequest(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),
}
