//! Programmer Error Types

use thiserror::Error;

/// Errors reported by range transactions
///
/// Single-byte operations cannot fail at this layer; a mistimed pulse or
/// direction change on real hardware is a defect, not a recoverable
/// condition, and nothing here retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgrammerError {
    /// Range with `end <= start`
    #[error("invalid address range {start:#05X}..{end:#05X}")]
    InvalidRange { start: u16, end: u16 },

    /// Supplied byte count does not cover the range
    #[error("range covers {expected} bytes but {supplied} were supplied")]
    ShortInput { expected: usize, supplied: usize },

    /// Hardware-layer fault, fatal to the current operation only
    #[error("bus fault: {0}")]
    BusFault(String),
}
