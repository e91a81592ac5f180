//! Console Configuration
//!
//! Defaults suit the stock programmer wiring: 115200 baud link, 256-byte
//! receive buffer, 16-byte data page, 5 ms write cycle. A local
//! `eeprom-console.toml` and `EEPROM_*` environment variables override them.

use crate::error::ConsoleError;
use serde::{Deserialize, Serialize};

/// Full console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Byte link to the operator: "stdio" or "serial"
    pub transport: String,
    /// Serial device path, used by the serial transport
    pub serial_device: String,
    /// Serial baud rate
    pub serial_baud: u32,
    /// Character separating fields within one packet
    pub delimiter: char,
    /// Character ending a packet
    pub terminator: char,
    /// Maximum data bytes in one data packet
    pub page_size: usize,
    /// Receive ring buffer capacity in bytes
    pub buffer_capacity: usize,
    /// Parser poll rate in Hz
    pub polling_hz: u64,
    /// Device write-cycle settle time in milliseconds
    pub write_cycle_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            serial_device: "/dev/ttyACM0".to_string(),
            serial_baud: 115_200,
            delimiter: ' ',
            terminator: '\n',
            page_size: ach_protocol::framing::PAGE_SIZE,
            buffer_capacity: ring_buffer::DEFAULT_CAPACITY,
            polling_hz: 20,
            write_cycle_ms: memory_programmer::WRITE_CYCLE_MS,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration: defaults, then `eeprom-console.toml`, then
    /// `EEPROM_*` environment overrides
    pub fn load() -> Result<Self, ConsoleError> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(::config::File::with_name("eeprom-console").required(false))
            .add_source(::config::Environment::with_prefix("EEPROM"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Framing characters as wire bytes, rejecting non-ASCII overrides
    pub fn framing_bytes(&self) -> Result<(u8, u8), ConsoleError> {
        if !self.delimiter.is_ascii() || !self.terminator.is_ascii() {
            return Err(ConsoleError::NonAsciiFraming);
        }
        Ok((self.delimiter as u8, self.terminator as u8))
    }

    /// Poll interval derived from the configured rate
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / self.polling_hz.max(1))
    }
}
