//! Error taxonomy for the cache core.
//!
//! One numeric taxonomy: `Ok == 0`, failures live in `[1, 100]`,
//! warnings/recoverable conditions live in `[101, 200]`.

use thiserror::Error;

/// Which band a code falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBand {
    Ok,
    Failure,
    Warning,
}

/// All recoverable and fatal conditions the core can report.
///
/// Fatal conditions (`Generic`, `NoMemory`, `BadArgs`) are not meant to be handled
/// by a caller in the general case; the core terminates the process when one of
/// these arises from an unrecoverable precondition violation (see [`fatal`]).
/// Recoverable/warning variants propagate to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccrsError {
    #[error("generic failure: {0}")]
    Generic(String),

    #[error("out of memory")]
    NoMemory,

    #[error("bad arguments: {0}")]
    BadArgs(String),

    #[error("try again")]
    TryAgain,

    #[error("buffer not found")]
    BufferNotFound,

    #[error("buffer is victimized")]
    BufferIsVictimized,

    #[error("buffer already exists")]
    BufferAlreadyExists,

    #[error("buffer missing data")]
    BufferMissingData,

    #[error("buffer already compressed")]
    BufferAlreadyCompressed,

    #[error("buffer already decompressed")]
    BufferAlreadyDecompressed,

    #[error("buffer compression problem: {0}")]
    BufferCompressionProblem(String),

    #[error("buffer missing a pin")]
    BufferMissingAPin,

    #[error("buffer is dirty")]
    BufferIsDirty,

    #[error("list cannot balance")]
    ListCannotBalance,

    #[error("list removal failed")]
    ListRemoval,

    #[error("buffer poofed")]
    BufferPoofed,
}

pub type Result<T> = std::result::Result<T, AccrsError>;

impl AccrsError {
    /// The taxonomy's fixed numeric code for this variant.
    pub fn code(&self) -> u16 {
        match self {
            AccrsError::Generic(_) => 1,
            AccrsError::NoMemory => 150,
            AccrsError::BadArgs(_) => 190,
            AccrsError::TryAgain => 101,
            AccrsError::BufferNotFound => 120,
            AccrsError::BufferIsVictimized => 121,
            AccrsError::BufferAlreadyExists => 122,
            AccrsError::BufferMissingData => 123,
            AccrsError::BufferAlreadyCompressed => 124,
            AccrsError::BufferAlreadyDecompressed => 125,
            AccrsError::BufferCompressionProblem(_) => 126,
            AccrsError::BufferMissingAPin => 127,
            AccrsError::BufferIsDirty => 128,
            AccrsError::BufferPoofed => 129,
            AccrsError::ListCannotBalance => 140,
            AccrsError::ListRemoval => 141,
        }
    }

    pub fn band(&self) -> ErrorBand {
        match self.code() {
            0 => ErrorBand::Ok,
            1..=100 => ErrorBand::Failure,
            _ => ErrorBand::Warning,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.band() == ErrorBand::Warning
    }
}

/// Terminates the process for a fatal precondition violation -- no attempt at
/// partial recovery is made. Used only for conditions the core itself
/// considers unreachable under correct operation (e.g. `sweep_goal` saturated
/// at 99% and still unable to free enough memory, a codec failure, or lock
/// pool initialization failure).
pub fn fatal(msg: impl std::fmt::Display) -> ! {
    tracing::error!("fatal: {msg}");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_match_taxonomy() {
        assert_eq!(AccrsError::Generic("x".into()).band(), ErrorBand::Failure);
        assert_eq!(AccrsError::NoMemory.band(), ErrorBand::Failure);
        assert_eq!(AccrsError::BadArgs("x".into()).band(), ErrorBand::Failure);
        assert_eq!(AccrsError::TryAgain.band(), ErrorBand::Warning);
        assert_eq!(AccrsError::BufferNotFound.band(), ErrorBand::Warning);
        assert_eq!(AccrsError::BufferPoofed.band(), ErrorBand::Warning);
    }

    #[test]
    fn codes_are_fixed() {
        assert_eq!(AccrsError::Generic(String::new()).code(), 1);
        assert_eq!(AccrsError::BufferNotFound.code(), 120);
        assert_eq!(AccrsError::BufferIsVictimized.code(), 121);
        assert_eq!(AccrsError::BufferAlreadyExists.code(), 122);
        assert_eq!(AccrsError::ListCannotBalance.code(), 140);
        assert_eq!(AccrsError::NoMemory.code(), 150);
        assert_eq!(AccrsError::BadArgs(String::new()).code(), 190);
    }
}
