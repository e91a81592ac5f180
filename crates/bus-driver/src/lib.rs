//! Bit-Bang Bus Driver
//!
//! Low-level primitives for driving an external memory device: serial
//! shift-out of a 16-bit address word into a shift register, storage-latch
//! pulsing, and level/direction control of the 8-bit data bus. Pins and
//! delays are injected behind small traits so the same driver runs against
//! real GPIO or the in-process mock chip.

mod driver;
mod pin;

pub mod mock;

pub use driver::{BitOrder, BusDriver, BusPins, Line};
pub use pin::{Delay, Direction, GpioPin, Level, NoopDelay, WallClockDelay};
