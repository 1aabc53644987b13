//! Signal error taxonomy (§7).

use thiserror::Error;

pub type SignalResult<T> = Result<T, SignalError>;

#[derive(Debug, Error)]
pub enum SignalError {
    /// Recoverable by falling back to the default signal.
    #[error("no signal configured in {0}")]
    NoSignalConfigured(String),

    /// Configuration is malformed; fatal at load time, surfaced.
    #[error("signal validation failed: {0}")]
    Validation(String),

    /// Transient or programmer error in worker protocol; recoverable
    /// via default-signal fallback at evaluate time, fatal if raised
    /// by the default.
    #[error("signal connection error: {0}")]
    Connection(String),

    /// Unexpected worker failure, wrapped; recoverable as above.
    #[error("signal failed unexpectedly: {0}")]
    Unexpected(#[source] anyhow::Error),
}
