//! Mock Chip for Testing (no hardware required)
//!
//! Simulates the address shift register and a 2 KiB byte-addressable
//! memory device at pin level. Every pin handed out by [`MockChip::pins`]
//! shares one chip state, so the driver's bit-banging is observed exactly
//! as a real board would see it: shift-clock edges capture serial bits,
//! the storage latch transfers the shifted word, output-enable gates the
//! device onto the data bus, and a write-enable pulse commits the bus
//! contents to the addressed cell.

use crate::driver::{BusPins, Line};
use crate::pin::{Direction, GpioPin, Level};
use std::sync::{Arc, Mutex, MutexGuard};

/// Which line of the shared chip a mock pin is bound to
#[derive(Debug, Clone, Copy)]
enum MockLine {
    Control(Line),
    Data(usize),
}

#[derive(Debug)]
struct ChipState {
    memory: Vec<u8>,
    /// Current serial-data line level
    serial_in: bool,
    shift_clock: Level,
    storage_latch: Level,
    output_enable: Level,
    write_enable: Level,
    /// Shift-register contents; new bits enter at bit 0
    shift_register: u16,
    /// Word held by the storage register after the last latch pulse
    latched_word: u16,
    clock_pulses: usize,
    /// Serial levels captured at each shift-clock rising edge
    shifted_bits: Vec<bool>,
    /// Level driven by the controller on each data line
    bus_driven: [bool; 8],
    /// Direction of each data line, from the controller's perspective
    bus_direction: [Direction; 8],
    /// Committed (address, byte) pairs, oldest first
    writes: Vec<(u16, u8)>,
    /// Times both sides drove the data bus at once
    bus_conflicts: usize,
}

impl ChipState {
    /// The controller and the device drive the bus together whenever a
    /// data line is an output while output-enable is asserted
    fn check_conflict(&mut self) {
        if self.output_enable == Level::Low
            && self.bus_direction.iter().any(|d| *d == Direction::Output)
        {
            self.bus_conflicts += 1;
        }
    }

    /// Address currently presented on the storage-register outputs
    fn latched_address(&self) -> u16 {
        self.latched_word & (MockChip::MEMORY_BYTES as u16 - 1)
    }

    fn bus_byte(&self) -> u8 {
        let mut byte = 0u8;
        for (bit, driven) in self.bus_driven.iter().enumerate() {
            byte |= (*driven as u8) << bit;
        }
        byte
    }
}

/// Shared-state simulated chip
#[derive(Clone)]
pub struct MockChip {
    state: Arc<Mutex<ChipState>>,
}

impl MockChip {
    /// Cells in the simulated device (11-bit address space)
    pub const MEMORY_BYTES: usize = 2048;

    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState {
                memory: vec![0u8; Self::MEMORY_BYTES],
                serial_in: false,
                shift_clock: Level::Low,
                storage_latch: Level::Low,
                output_enable: Level::High,
                write_enable: Level::High,
                shift_register: 0,
                latched_word: 0,
                clock_pulses: 0,
                shifted_bits: Vec::new(),
                bus_driven: [false; 8],
                bus_direction: [Direction::Input; 8],
                writes: Vec::new(),
                bus_conflicts: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Produce one bound pin per logical line, all sharing this chip
    pub fn pins(&self) -> BusPins<MockPin> {
        let pin = |line| MockPin {
            line,
            state: Arc::clone(&self.state),
        };
        BusPins {
            serial_data: pin(MockLine::Control(Line::SerialData)),
            shift_clock: pin(MockLine::Control(Line::ShiftClock)),
            storage_latch: pin(MockLine::Control(Line::StorageLatch)),
            output_enable: pin(MockLine::Control(Line::OutputEnable)),
            write_enable: pin(MockLine::Control(Line::WriteEnable)),
            data_bus: [
                pin(MockLine::Data(0)),
                pin(MockLine::Data(1)),
                pin(MockLine::Data(2)),
                pin(MockLine::Data(3)),
                pin(MockLine::Data(4)),
                pin(MockLine::Data(5)),
                pin(MockLine::Data(6)),
                pin(MockLine::Data(7)),
            ],
        }
    }

    /// Preload cells starting at `address`
    pub fn load(&self, address: u16, bytes: &[u8]) {
        let mut state = self.state();
        for (offset, byte) in bytes.iter().enumerate() {
            let index = address as usize + offset;
            if index < state.memory.len() {
                state.memory[index] = *byte;
            }
        }
    }

    /// Read one cell directly, bypassing the bus
    pub fn cell(&self, address: u16) -> u8 {
        self.state().memory[address as usize % Self::MEMORY_BYTES]
    }

    /// Address currently latched onto the device's address lines
    pub fn latched_address(&self) -> u16 {
        self.state().latched_address()
    }

    /// Full 16-bit word held by the storage register
    pub fn latched_word(&self) -> u16 {
        self.state().latched_word
    }

    /// Shift-clock pulses observed since creation
    pub fn clock_pulses(&self) -> usize {
        self.state().clock_pulses
    }

    /// Serial levels captured at each shift-clock rising edge
    pub fn shifted_bits(&self) -> Vec<bool> {
        self.state().shifted_bits.clone()
    }

    /// Committed (address, byte) pairs, oldest first
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.state().writes.clone()
    }

    /// Times the controller and the device drove the bus simultaneously;
    /// any non-zero count is a sequencing defect in the caller
    pub fn bus_conflicts(&self) -> usize {
        self.state().bus_conflicts
    }

    /// Current write-enable line level
    pub fn write_enable_level(&self) -> Level {
        self.state().write_enable
    }
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

/// One line of the mock chip, usable wherever a [`GpioPin`] is expected
pub struct MockPin {
    line: MockLine,
    state: Arc<Mutex<ChipState>>,
}

impl MockPin {
    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GpioPin for MockPin {
    fn write(&mut self, level: Level) {
        let mut state = self.state();
        match self.line {
            MockLine::Control(Line::SerialData) => {
                state.serial_in = level.is_high();
            }
            MockLine::Control(Line::ShiftClock) => {
                let rising = state.shift_clock == Level::Low && level == Level::High;
                state.shift_clock = level;
                if rising {
                    let bit = state.serial_in;
                    state.shift_register = state.shift_register << 1 | bit as u16;
                    state.clock_pulses += 1;
                    state.shifted_bits.push(bit);
                }
            }
            MockLine::Control(Line::StorageLatch) => {
                let rising = state.storage_latch == Level::Low && level == Level::High;
                state.storage_latch = level;
                if rising {
                    // The first-shifted bit has travelled to the highest
                    // register output, so the board wiring reverses the word
                    state.latched_word = state.shift_register.reverse_bits();
                }
            }
            MockLine::Control(Line::OutputEnable) => {
                state.output_enable = level;
                state.check_conflict();
            }
            MockLine::Control(Line::WriteEnable) => {
                // Data is committed on the rising edge of write enable
                let rising = state.write_enable == Level::Low && level == Level::High;
                state.write_enable = level;
                if rising {
                    let address = state.latched_address();
                    let byte = state.bus_byte();
                    let index = address as usize;
                    state.memory[index] = byte;
                    state.writes.push((address, byte));
                }
            }
            MockLine::Data(bit) => {
                state.bus_driven[bit] = level.is_high();
            }
        }
    }

    fn read(&self) -> Level {
        let state = self.state();
        match self.line {
            MockLine::Data(bit) => {
                let device_driving = state.output_enable == Level::Low
                    && state.bus_direction[bit] == Direction::Input;
                if device_driving {
                    let byte = state.memory[state.latched_address() as usize];
                    Level::from_bit(byte >> bit & 1 != 0)
                } else {
                    Level::from_bit(state.bus_driven[bit])
                }
            }
            MockLine::Control(Line::SerialData) => Level::from_bit(state.serial_in),
            MockLine::Control(Line::ShiftClock) => state.shift_clock,
            MockLine::Control(Line::StorageLatch) => state.storage_latch,
            MockLine::Control(Line::OutputEnable) => state.output_enable,
            MockLine::Control(Line::WriteEnable) => state.write_enable,
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        let mut state = self.state();
        if let MockLine::Data(bit) = self.line {
            state.bus_direction[bit] = direction;
            state.check_conflict();
        }
    }
}
