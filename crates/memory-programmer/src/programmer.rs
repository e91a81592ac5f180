//! Programmer Implementation

use crate::error::ProgrammerError;
use crate::{ADDRESS_MAX, WRITE_CYCLE_MS};
use bus_driver::{BitOrder, BusDriver, BusPins, Delay, Direction, GpioPin, Level, Line};
use tracing::debug;

/// Timing configuration
#[derive(Debug, Clone)]
pub struct ProgrammerConfig {
    /// Settle time after each write-enable pulse, in milliseconds
    pub write_cycle_ms: u64,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            write_cycle_ms: WRITE_CYCLE_MS,
        }
    }
}

/// Transaction layer over one bound memory device
pub struct MemoryProgrammer<P: GpioPin, D: Delay> {
    bus: BusDriver<P>,
    delay: D,
    write_cycle_ms: u64,
}

impl<P: GpioPin, D: Delay> MemoryProgrammer<P, D> {
    /// Bind a programmer to the device's pins
    pub fn new(pins: BusPins<P>, delay: D, config: ProgrammerConfig) -> Self {
        Self {
            bus: BusDriver::new(pins),
            delay,
            write_cycle_ms: config.write_cycle_ms,
        }
    }

    /// Latch an address onto the device's address lines
    ///
    /// Bits above the 11-bit address space are masked off before the word
    /// is shifted out LSB-first.
    pub fn set_address(&mut self, address: u16) {
        let address = address & ADDRESS_MAX;
        self.bus.shift_word(BitOrder::LsbFirst, address);
        self.bus.latch();
    }

    /// Read one byte from `address`
    ///
    /// The bus direction is switched to input BEFORE output enable is
    /// asserted so the controller and the device never drive the bus at
    /// the same time.
    pub fn read_byte(&mut self, address: u16) -> u8 {
        self.bus.set_bus_direction(Direction::Input);
        self.bus.set_level(Line::OutputEnable, Level::Low);
        self.set_address(address);
        self.bus.read_bus()
    }

    /// Write one byte to `address`
    ///
    /// Output enable is deasserted BEFORE the bus direction is switched to
    /// output, mirroring the read-path ordering constraint. The byte is
    /// committed by a negative write-enable pulse followed by the device
    /// write-cycle settle time.
    pub fn write_byte(&mut self, address: u16, byte: u8) {
        self.bus.set_level(Line::OutputEnable, Level::High);
        self.bus.set_bus_direction(Direction::Output);
        self.set_address(address);
        self.bus.write_bus(byte);
        self.bus.pulse_low(Line::WriteEnable);
        self.delay.delay_ms(self.write_cycle_ms);
    }

    /// Lazily read every byte in `[start, end]`
    ///
    /// The returned reader performs one bus read per element as it is
    /// advanced; it is finite and cannot be restarted.
    pub fn read_range(
        &mut self,
        start: u16,
        end: u16,
    ) -> Result<RangeReader<'_, P, D>, ProgrammerError> {
        if end <= start {
            return Err(ProgrammerError::InvalidRange { start, end });
        }
        debug!(start, end, "range read");
        Ok(RangeReader {
            programmer: self,
            next: start,
            end,
            done: false,
        })
    }

    /// Write `bytes` sequentially starting at `start`
    ///
    /// The byte count must cover `[start, end]` exactly; nothing touches
    /// the bus otherwise.
    pub fn write_range(
        &mut self,
        start: u16,
        end: u16,
        bytes: &[u8],
    ) -> Result<(), ProgrammerError> {
        if end <= start {
            return Err(ProgrammerError::InvalidRange { start, end });
        }
        let expected = (end - start) as usize + 1;
        if bytes.len() != expected {
            return Err(ProgrammerError::ShortInput {
                expected,
                supplied: bytes.len(),
            });
        }

        debug!(start, end, "range write");
        for (offset, byte) in bytes.iter().enumerate() {
            self.write_byte(start + offset as u16, *byte);
        }
        Ok(())
    }
}

/// Lazy byte reader over an inclusive address range
pub struct RangeReader<'a, P: GpioPin, D: Delay> {
    programmer: &'a mut MemoryProgrammer<P, D>,
    next: u16,
    end: u16,
    done: bool,
}

impl<P: GpioPin, D: Delay> Iterator for RangeReader<'_, P, D> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.done {
            return None;
        }
        let byte = self.programmer.read_byte(self.next);
        if self.next == self.end {
            self.done = true;
        } else {
            self.next += 1;
        }
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            (self.end - self.next) as usize + 1
        };
        (remaining, Some(remaining))
    }
}
