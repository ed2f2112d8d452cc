//! Error taxonomy for the signal-processing core.

use thiserror::Error;

/// Unified error type for the converter registry, DSP dispatcher, and FIFO.
///
/// The demodulator itself never returns an error (see `demod` module docs);
/// everything below init time is folded into statistics instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("fifo full")]
    FifoFull,

    #[error("fifo shut down")]
    FifoShutdown,

    #[error("error reading wisdom file: {0}")]
    WisdomIoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Exit code a CLI should return for this error, per the external
    /// interface contract. Only fatal-at-init variants are expected to
    /// reach this; it is harmless to call on the others.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::AllocationFailure(_) | CoreError::UnsupportedCombination(_) => 1,
            CoreError::WisdomIoError(_) => 2,
            CoreError::FifoFull | CoreError::FifoShutdown => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_variants_map_to_nonzero_exit() {
        assert_eq!(CoreError::AllocationFailure("x".into()).exit_code(), 1);
        assert_eq!(CoreError::UnsupportedCombination("x".into()).exit_code(), 1);
    }

    #[test]
    fn fifo_variants_are_not_fatal() {
        assert_eq!(CoreError::FifoFull.exit_code(), 0);
        assert_eq!(CoreError::FifoShutdown.exit_code(), 0);
    }
}
