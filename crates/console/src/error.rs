//! Console Error Types

use thiserror::Error;

/// Errors surfaced while wiring up or running the console
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Configuration file or environment override rejected
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Transport read/write failure
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Delimiter/terminator overrides must stay single-byte
    #[error("framing characters must be ASCII")]
    NonAsciiFraming,

    /// Unknown transport name in configuration
    #[error("unknown transport {0:?}, expected \"stdio\" or \"serial\"")]
    UnknownTransport(String),
}
