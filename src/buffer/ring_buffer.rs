//! Single-owner byte ring with head/tail cursors and an explicit empty flag

use crate::buffer::{ByteRing, ReadPosition};
use crate::domain::types::BufferCapacity;

/// Append-only byte ring for single-threaded use
///
/// `head` is the next unread byte and `tail` the next write slot, both modulo
/// capacity. Because `head == tail` holds both when the ring is empty and when
/// it is full, an explicit `empty` flag disambiguates, which lets the ring use
/// every byte of its capacity.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    empty: bool,
    read_offset: usize,
}

impl RingBuffer {
    pub fn new(capacity: BufferCapacity) -> Self {
        Self {
            buf: vec![0u8; capacity.into_inner()].into_boxed_slice(),
            head: 0,
            tail: 0,
            empty: true,
            read_offset: 0,
        }
    }

    /// Append bytes at the tail
    ///
    /// Returns `false` without touching the ring when `data` does not fit.
    pub fn append(&mut self, data: &[u8]) -> bool {
        if data.len() > self.free_bytes() {
            return false;
        }
        if data.is_empty() {
            return true;
        }

        let cap = self.buf.len();
        let first = (cap - self.tail).min(data.len());
        self.buf[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        if data.len() > first {
            self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        }
        self.tail = (self.tail + data.len()) % cap;
        self.empty = false;
        true
    }

    /// Bytes that can still be appended
    pub fn free_bytes(&self) -> usize {
        self.buf.len() - self.used_bytes()
    }

    /// Forget every buffered byte and zero the cursors
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.empty = true;
        self.read_offset = 0;
    }
}

impl ByteRing for RingBuffer {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn used_bytes(&self) -> usize {
        if self.empty {
            0
        } else if self.tail > self.head {
            self.tail - self.head
        } else {
            self.buf.len() - self.head + self.tail
        }
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        if offset >= self.used_bytes() {
            return None;
        }
        Some(self.buf[(self.head + offset) % self.buf.len()])
    }

    fn save_position(&self) -> ReadPosition {
        ReadPosition(self.read_offset)
    }

    fn restore_position(&mut self, position: ReadPosition) {
        self.read_offset = position.offset();
    }

    fn consume_bytes(&mut self, n: usize) -> usize {
        let used = self.used_bytes();
        let n = n.min(used);
        if n > 0 {
            self.head = (self.head + n) % self.buf.len();
            if n == used {
                self.empty = true;
            }
        }
        self.read_offset = 0;
        n
    }
}


#[cfg(test)]
#[path = "ring_buffer_tests.rs"]
mod ring_buffer_tests;
