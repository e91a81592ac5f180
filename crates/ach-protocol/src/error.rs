//! Protocol Error Types

use thiserror::Error;

/// Errors reported by the packet parser
///
/// "Not enough bytes buffered yet" is not an error; the parser reports it
/// as `Ok(None)` so the poll loop can retry without clearing anything.
/// Every variant here clears the ring buffer before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Delimiter or terminator found where the other was required
    #[error("misplaced delimiter or terminator in packet")]
    InvalidFormat,

    /// A coded field contains a character outside `0-9A-Fa-f`
    #[error("packet field is not valid ASCII-coded hex")]
    InvalidData,

    /// Instruction code is not one of the recognized commands
    #[error("unrecognized instruction code {0:#04X}")]
    InvalidInstruction(u8),

    /// Decoded address lies outside the device address space
    #[error("address {address:#05X} exceeds the device address space")]
    InvalidAddress { address: u16 },

    /// Ranged packet with `end <= start`, or a data request that cannot
    /// fit one page
    #[error("invalid address range {start:#05X}..{end:#05X}")]
    InvalidRange { start: u16, end: u16 },
}
