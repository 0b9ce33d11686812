use qkdnet_bb84::Bb84Error;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    /// The executor could not be reached. Callers fall back to local results.
    #[error("remote quantum service unavailable: {0}")]
    RemoteServiceUnavailable(String),
    #[error("job failed: {0}")]
    JobFailed(String),
    #[error("job did not complete within {0:?}")]
    Timeout(Duration),
    #[error("unexpected executor response: {0}")]
    Decode(String),
    #[error(transparent)]
    Protocol(#[from] Bb84Error),
}

pub type HardwareResult<T> = Result<T, HardwareError>;
