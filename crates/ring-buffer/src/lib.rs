//! Lock-Free Byte Ring Buffer
//!
//! Provides the SPSC queue between the serial receive path and the packet
//! poll loop. The receive side pushes one byte at a time; the poll loop
//! drains bytes through the packet parser.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};

use thiserror::Error;

/// Errors reported by the non-destructive buffer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// `write` refused because the buffer already holds `capacity` bytes
    #[error("ring buffer is full")]
    Full,

    /// `read` refused because no unread bytes are available
    #[error("ring buffer is empty")]
    Empty,
}
