use std::collections::TryReserveError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("failed to allocate {len} elements for {what}")]
    Allocation {
        what: &'static str,
        len: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Checks that a caller supplied buffer has exactly the expected length.
pub fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::LengthMismatch { what, expected, actual })
    }
}

/// Checks that a caller supplied scratch buffer holds at least `required` elements.
pub fn check_capacity(what: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual >= required {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            what,
            expected: required,
            actual,
        })
    }
}
