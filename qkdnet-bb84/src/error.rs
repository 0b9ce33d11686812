use thiserror::Error;

/// Failures surfaced by the BB84 engine.
///
/// Every variant is returned synchronously to the caller; the engine never
/// clamps or repairs bad input on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bb84Error {
    /// Malformed run configuration or mismatched vector lengths.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Encryption or messaging was attempted without a secure key.
    #[error("no secure key available: {0}")]
    NoSecureKey(String),
}

/// Alias for fallible BB84 operations.
pub type Bb84Result<T> = Result<T, Bb84Error>;

impl Bb84Error {
    pub(crate) fn length_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Bb84Error::InvalidParameter(format!(
            "{what} has length {actual}, expected {expected}"
        ))
    }
}

pub(crate) fn ensure_len<T>(what: &str, values: &[T], expected: usize) -> Bb84Result<()> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(Bb84Error::length_mismatch(what, expected, values.len()))
    }
}
