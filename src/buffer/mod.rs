//! Byte rings that hold the unconsumed device stream
//!
//! Two implementations share one consumer-side contract, [`ByteRing`]:
//! - [`RingBuffer`]: single owner, used inline and in tests
//! - [`SharedRingBuffer`]: split into a producer and a consumer half that live
//!   on different threads and coordinate only through atomic cursors

pub mod ring_buffer;
pub mod shared_ring_buffer;

pub use ring_buffer::RingBuffer;
pub use shared_ring_buffer::{RingConsumer, RingProducer, RingStats, SharedRingBuffer};

use bytes::Bytes;

/// Snapshot of the speculative read cursor, relative to the unread head
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadPosition(usize);

impl ReadPosition {
    /// The unread head itself
    pub const HEAD: ReadPosition = ReadPosition(0);

    /// Position `offset` bytes past the unread head
    pub fn at(offset: usize) -> Self {
        Self(offset)
    }

    pub fn offset(self) -> usize {
        self.0
    }
}

/// Consumer-side view of a byte ring
///
/// Reads never consume: `read_byte` advances a speculative cursor that can be
/// saved and restored, and only `consume_bytes` moves the head.
pub trait ByteRing {
    /// Total bytes the ring can hold
    fn capacity(&self) -> usize;

    /// Bytes appended but not yet consumed
    fn used_bytes(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.used_bytes() == 0
    }

    /// Byte at `offset` from the unread head, if buffered
    fn peek_byte(&self, offset: usize) -> Option<u8>;

    /// Current speculative cursor
    fn save_position(&self) -> ReadPosition;

    /// Roll the speculative cursor back (or forward) to a saved position
    fn restore_position(&mut self, position: ReadPosition);

    /// Byte under the speculative cursor, advancing it
    fn read_byte(&mut self) -> Option<u8> {
        let position = self.save_position();
        let byte = self.peek_byte(position.offset())?;
        self.restore_position(ReadPosition(position.offset() + 1));
        Some(byte)
    }

    /// Irreversibly drop up to `n` bytes from the head; returns how many were dropped
    ///
    /// The speculative cursor is rewound to the new head.
    fn consume_bytes(&mut self, n: usize) -> usize;

    /// Copy of the first `n` unread bytes (fewer if less are buffered)
    fn copy_out(&self, n: usize) -> Bytes {
        let len = n.min(self.used_bytes());
        let bytes: Vec<u8> = (0..len).filter_map(|i| self.peek_byte(i)).collect();
        Bytes::from(bytes)
    }
}
