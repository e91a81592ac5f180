//! SPSC Ring Buffer Implementation

use crate::BufferError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default buffer capacity (one full 256-byte command packet)
pub const DEFAULT_CAPACITY: usize = 256;

/// Lock-free SPSC ring buffer for received command bytes.
///
/// Storage is `capacity + 1` slots so full and empty are distinguishable
/// from the indices alone: `head == tail` is empty, `tail + 1 == head`
/// (mod storage size) is full. `head` is the next byte to read, `tail` the
/// next slot to write.
///
/// The receive task is the only writer (`write_overwrite`), the poll loop
/// the only reader (`read`/`reset`). At the full boundary an overwrite can
/// race an in-flight `read` and discard the byte the reader was about to
/// take; the command channel favors freshness over completeness, so that
/// byte is allowed to be lost.
pub struct RingBuffer {
    /// Pre-allocated storage, `capacity + 1` bytes
    storage: Box<[u8]>,
    /// Usable capacity in bytes
    capacity: usize,
    /// Read position (next byte to read)
    head: AtomicUsize,
    /// Write position (next slot to write)
    tail: AtomicUsize,
    /// Bytes discarded by overwrites (for statistics)
    dropped: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            storage: vec![0u8; capacity + 1].into_boxed_slice(),
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Create a buffer with default capacity (256 bytes)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Size of the backing store, one more than the usable capacity
    #[inline]
    fn mem_size(&self) -> usize {
        self.capacity + 1
    }

    #[inline]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.mem_size() {
            0
        } else {
            next
        }
    }

    /// Queue a byte without destroying unread data
    ///
    /// Refuses with [`BufferError::Full`] when the buffer already holds
    /// `capacity` unread bytes.
    pub fn write(&self, byte: u8) -> Result<(), BufferError> {
        if self.is_full() {
            return Err(BufferError::Full);
        }
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: we're the only writer and `tail` points at a free slot,
        // storage is pre-allocated
        unsafe {
            let ptr = self.storage.as_ptr() as *mut u8;
            std::ptr::write(ptr.add(tail), byte);
        }

        self.tail.store(self.advance(tail), Ordering::Release);
        Ok(())
    }

    /// Queue a byte, discarding the oldest unread byte when full
    ///
    /// The receive path uses this exclusively: a stale command byte is worth
    /// less than the one that just arrived, so occupancy never exceeds
    /// `capacity` and the producer never blocks.
    pub fn write_overwrite(&self, byte: u8) {
        // Advance the read index first when full so the oldest byte is the
        // one discarded
        if self.is_full() {
            let head = self.head.load(Ordering::Relaxed);
            self.head.store(self.advance(head), Ordering::Release);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: single writer, slot freed above if the buffer was full
        unsafe {
            let ptr = self.storage.as_ptr() as *mut u8;
            std::ptr::write(ptr.add(tail), byte);
        }

        self.tail.store(self.advance(tail), Ordering::Release);
    }

    /// Dequeue the oldest unread byte
    pub fn read(&self) -> Result<u8, BufferError> {
        if self.is_empty() {
            return Err(BufferError::Empty);
        }
        let head = self.head.load(Ordering::Relaxed);
        let byte = self.storage[head];
        self.head.store(self.advance(head), Ordering::Release);
        Ok(byte)
    }

    /// Logically empty the buffer without clearing the backing store
    pub fn reset(&self) {
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
    }

    /// Number of unread bytes currently queued, never exceeds `capacity`
    pub fn len(&self) -> usize {
        if self.is_full() {
            return self.capacity;
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + self.mem_size() - head) % self.mem_size()
    }

    /// Check if no unread bytes are queued
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head == tail
    }

    /// Check if the buffer holds `capacity` unread bytes
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.advance(tail) == head
    }

    /// Usable capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes discarded by `write_overwrite` (for statistics)
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

// SAFETY: RingBuffer is designed for SPSC use: one task writing, one task
// reading, each mutating only its own index.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_write_then_read_round_trip() {
        let buffer = RingBuffer::new(8);

        for byte in [0x41, 0x42, 0x43] {
            buffer.write(byte).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.read(), Ok(0x41));
        assert_eq!(buffer.read(), Ok(0x42));
        assert_eq!(buffer.read(), Ok(0x43));
        assert_eq!(buffer.read(), Err(BufferError::Empty));
    }

    #[test]
    fn test_write_rejects_when_full() {
        let buffer = RingBuffer::new(4);

        for byte in 0..4 {
            buffer.write(byte).unwrap();
        }

        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.write(0xFF), Err(BufferError::Full));
        // Rejected write destroyed nothing
        assert_eq!(buffer.read(), Ok(0));
    }

    #[test]
    fn test_overwrite_discards_oldest() {
        let buffer = RingBuffer::new(3);

        for byte in [1, 2, 3] {
            buffer.write_overwrite(byte);
        }
        assert!(buffer.is_full());

        buffer.write_overwrite(4);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 1);
        assert_eq!(buffer.read(), Ok(2));
        assert_eq!(buffer.read(), Ok(3));
        assert_eq!(buffer.read(), Ok(4));
    }

    #[test]
    fn test_reset_logically_empties() {
        let buffer = RingBuffer::new(4);
        buffer.write(0xAA).unwrap();
        buffer.write(0xBB).unwrap();

        buffer.reset();

        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.read(), Err(BufferError::Empty));
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let buffer = RingBuffer::new(4);

        // Walk the indices past the wrap point a few times
        for round in 0u8..4 {
            for i in 0..3 {
                buffer.write(round * 10 + i).unwrap();
            }
            for i in 0..3 {
                assert_eq!(buffer.read(), Ok(round * 10 + i));
            }
        }
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_fills_at_exactly_capacity(capacity in 1usize..64) {
            let buffer = RingBuffer::new(capacity);
            for i in 0..capacity {
                prop_assert!(!buffer.is_full());
                prop_assert!(buffer.write(i as u8).is_ok());
                prop_assert!(buffer.len() <= capacity);
            }
            prop_assert!(buffer.is_full());
            prop_assert_eq!(buffer.write(0), Err(BufferError::Full));
        }

        #[test]
        fn prop_overwrite_never_exceeds_capacity(
            capacity in 1usize..32,
            bytes in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            let buffer = RingBuffer::new(capacity);
            for byte in &bytes {
                buffer.write_overwrite(*byte);
                prop_assert!(buffer.len() <= capacity);
            }
            // The survivors are exactly the newest `min(len, capacity)` bytes
            let expected: Vec<u8> = bytes
                .iter()
                .copied()
                .skip(bytes.len().saturating_sub(capacity))
                .collect();
            let mut drained = Vec::new();
            while let Ok(byte) = buffer.read() {
                drained.push(byte);
            }
            prop_assert_eq!(drained, expected);
        }
    }
}
