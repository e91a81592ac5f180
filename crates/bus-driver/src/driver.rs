//! Bus Driver Implementation

use crate::pin::{Direction, GpioPin, Level};
use tracing::debug;

/// Number of bits committed per `shift_word` call
const WORD_BITS: u8 = 16;

/// Logical control lines driven by the bus driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// Serial input of the address shift register
    SerialData,
    /// Shift-register clock; one pulse commits one bit
    ShiftClock,
    /// Storage-register clock; one pulse moves shifted bits to the outputs
    StorageLatch,
    /// Device output enable, active low
    OutputEnable,
    /// Device write enable, active low
    WriteEnable,
}

/// Bit order for serial shift-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    LsbFirst,
    MsbFirst,
}

/// Full pin binding for one device
pub struct BusPins<P> {
    pub serial_data: P,
    pub shift_clock: P,
    pub storage_latch: P,
    pub output_enable: P,
    pub write_enable: P,
    pub data_bus: [P; 8],
}

/// Bit-bang driver over a bound set of pins
pub struct BusDriver<P: GpioPin> {
    serial_data: P,
    shift_clock: P,
    storage_latch: P,
    output_enable: P,
    write_enable: P,
    data_bus: [P; 8],
}

impl<P: GpioPin> BusDriver<P> {
    /// Bind the driver to a set of pins
    pub fn new(pins: BusPins<P>) -> Self {
        Self {
            serial_data: pins.serial_data,
            shift_clock: pins.shift_clock,
            storage_latch: pins.storage_latch,
            output_enable: pins.output_enable,
            write_enable: pins.write_enable,
            data_bus: pins.data_bus,
        }
    }

    /// Shift a 16-bit word into the address shift register
    ///
    /// For each bit the serial line is driven to the bit value, then the
    /// shift clock is pulsed high/low; exactly one clock pulse commits
    /// each bit, 16 pulses per word.
    pub fn shift_word(&mut self, order: BitOrder, word: u16) {
        for i in 0..WORD_BITS {
            let bit = match order {
                BitOrder::LsbFirst => word >> i & 1,
                BitOrder::MsbFirst => word >> (WORD_BITS - 1 - i) & 1,
            };
            self.serial_data.write(Level::from_bit(bit != 0));
            self.shift_clock.write(Level::High);
            self.shift_clock.write(Level::Low);
        }
    }

    /// Pulse the storage-register clock, moving the shifted bits onto the
    /// parallel outputs that drive the device's address lines
    pub fn latch(&mut self) {
        self.storage_latch.write(Level::High);
        self.storage_latch.write(Level::Low);
    }

    /// Sample the 8 data lines, most-significant pin first
    pub fn read_bus(&self) -> u8 {
        let mut byte = 0u8;
        for pin in self.data_bus.iter().rev() {
            byte = (byte << 1) | pin.read().is_high() as u8;
        }
        byte
    }

    /// Drive a byte onto the 8 data lines, least-significant bit first
    pub fn write_bus(&mut self, byte: u8) {
        let mut byte = byte;
        for pin in self.data_bus.iter_mut() {
            pin.write(Level::from_bit(byte & 1 != 0));
            byte >>= 1;
        }
    }

    /// Reconfigure every data-bus line at once
    pub fn set_bus_direction(&mut self, direction: Direction) {
        debug!(?direction, "data bus direction change");
        for pin in self.data_bus.iter_mut() {
            pin.set_direction(direction);
        }
    }

    /// Drive one control line to a level
    pub fn set_level(&mut self, line: Line, level: Level) {
        self.control_pin(line).write(level);
    }

    /// Negative pulse on a control line (assert low, release high)
    pub fn pulse_low(&mut self, line: Line) {
        let pin = self.control_pin(line);
        pin.write(Level::Low);
        pin.write(Level::High);
    }

    fn control_pin(&mut self, line: Line) -> &mut P {
        match line {
            Line::SerialData => &mut self.serial_data,
            Line::ShiftClock => &mut self.shift_clock,
            Line::StorageLatch => &mut self.storage_latch,
            Line::OutputEnable => &mut self.output_enable,
            Line::WriteEnable => &mut self.write_enable,
        }
    }
}
