//! Lock-free single-producer/single-consumer byte ring
//!
//! The ring is split into a [`RingProducer`] (ingestion thread) and a
//! [`RingConsumer`] (extraction worker). Cursors are 64-bit stream positions
//! that only ever grow, so `head == tail` means empty without ambiguity and
//! `tail - head` is the number of unread bytes. Only the producer stores
//! `tail` and only the consumer stores `head`; each reads the other's cursor
//! with sequentially-consistent loads, which also publishes the byte cells
//! written or read before the cursor moved.
//!
//! Byte cells are `AtomicU8`, so no `unsafe` is needed to share the region.

use crate::buffer::{ByteRing, ReadPosition};
use crate::domain::types::{BufferCapacity, DroppedByteCount};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Statistics about ring usage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingStats {
    pub total_appended: u64,
    pub total_consumed: u64,
    pub overflow_events: u64,
    pub dropped_bytes: DroppedByteCount,
}

/// Memory region shared by both halves
#[derive(Debug)]
struct SharedRegion {
    cells: Box<[AtomicU8]>,
    head: AtomicU64,
    tail: AtomicU64,
    overflow_events: AtomicU64,
    dropped_bytes: AtomicU64,
}

impl SharedRegion {
    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn slot(&self, position: u64) -> &AtomicU8 {
        &self.cells[(position % self.cells.len() as u64) as usize]
    }

    fn stats(&self) -> RingStats {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        RingStats {
            total_appended: tail,
            total_consumed: head,
            overflow_events: self.overflow_events.load(Ordering::Relaxed),
            dropped_bytes: DroppedByteCount::from(self.dropped_bytes.load(Ordering::Relaxed)),
        }
    }
}

/// Owner of a shared region before it is split between two threads
#[derive(Debug)]
pub struct SharedRingBuffer {
    region: Arc<SharedRegion>,
}

impl SharedRingBuffer {
    pub fn new(capacity: BufferCapacity) -> Self {
        let cells: Vec<AtomicU8> = (0..capacity.into_inner()).map(|_| AtomicU8::new(0)).collect();
        Self {
            region: Arc::new(SharedRegion {
                cells: cells.into_boxed_slice(),
                head: AtomicU64::new(0),
                tail: AtomicU64::new(0),
                overflow_events: AtomicU64::new(0),
                dropped_bytes: AtomicU64::new(0),
            }),
        }
    }

    /// Hand out the two halves; each may be moved to its own thread
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let producer = RingProducer {
            region: Arc::clone(&self.region),
        };
        let consumer = RingConsumer {
            region: self.region,
            read_offset: 0,
        };
        (producer, consumer)
    }
}

/// Write half; owns `tail`
#[derive(Debug)]
pub struct RingProducer {
    region: Arc<SharedRegion>,
}

impl RingProducer {
    /// Append bytes without blocking
    ///
    /// Returns `false` when the ring lacks room for all of `data`; nothing is
    /// written in that case and the loss is counted.
    pub fn append(&self, data: &[u8]) -> bool {
        let region = &self.region;
        let tail = region.tail.load(Ordering::SeqCst);
        let head = region.head.load(Ordering::SeqCst);
        let free = region.capacity() - (tail - head) as usize;

        if data.len() > free {
            region.overflow_events.fetch_add(1, Ordering::Relaxed);
            region
                .dropped_bytes
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            return false;
        }

        for (i, byte) in data.iter().enumerate() {
            region.slot(tail + i as u64).store(*byte, Ordering::Relaxed);
        }
        region.tail.store(tail + data.len() as u64, Ordering::SeqCst);
        true
    }

    /// Bytes that can be appended right now
    pub fn free_bytes(&self) -> usize {
        let tail = self.region.tail.load(Ordering::SeqCst);
        let head = self.region.head.load(Ordering::SeqCst);
        self.region.capacity() - (tail - head) as usize
    }

    pub fn used_bytes(&self) -> usize {
        self.region.capacity() - self.free_bytes()
    }

    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Absolute stream position of the next byte to be written
    pub fn stream_position(&self) -> u64 {
        self.region.tail.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RingStats {
        self.region.stats()
    }
}

/// Read half; owns `head` and the speculative read cursor
#[derive(Debug)]
pub struct RingConsumer {
    region: Arc<SharedRegion>,
    read_offset: usize,
}

impl RingConsumer {
    /// Absolute stream position of the next unread byte
    pub fn stream_position(&self) -> u64 {
        self.region.head.load(Ordering::SeqCst)
    }

    /// Drop every byte before `position`, clamped to what has been written
    ///
    /// Used to resynchronize: the producer records its position when it asks
    /// for a reset and the consumer discards up to there, so bytes appended
    /// after the request survive. Returns the number of bytes discarded.
    pub fn discard_until(&mut self, position: u64) -> usize {
        let head = self.region.head.load(Ordering::SeqCst);
        let tail = self.region.tail.load(Ordering::SeqCst);
        let target = position.clamp(head, tail);
        self.region.head.store(target, Ordering::SeqCst);
        self.read_offset = 0;
        (target - head) as usize
    }

    /// Drop everything written so far
    pub fn discard_all(&mut self) -> usize {
        let tail = self.region.tail.load(Ordering::SeqCst);
        self.discard_until(tail)
    }

    pub fn stats(&self) -> RingStats {
        self.region.stats()
    }
}

impl ByteRing for RingConsumer {
    fn capacity(&self) -> usize {
        self.region.capacity()
    }

    fn used_bytes(&self) -> usize {
        let tail = self.region.tail.load(Ordering::SeqCst);
        let head = self.region.head.load(Ordering::SeqCst);
        (tail - head) as usize
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        let head = self.region.head.load(Ordering::SeqCst);
        let tail = self.region.tail.load(Ordering::SeqCst);
        let position = head + offset as u64;
        if position >= tail {
            return None;
        }
        Some(self.region.slot(position).load(Ordering::Relaxed))
    }

    fn save_position(&self) -> ReadPosition {
        ReadPosition(self.read_offset)
    }

    fn restore_position(&mut self, position: ReadPosition) {
        self.read_offset = position.offset();
    }

    fn consume_bytes(&mut self, n: usize) -> usize {
        let head = self.region.head.load(Ordering::SeqCst);
        let tail = self.region.tail.load(Ordering::SeqCst);
        let n = n.min((tail - head) as usize);
        self.region.head.store(head + n as u64, Ordering::SeqCst);
        self.read_offset = 0;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn shared(capacity: usize) -> (RingProducer, RingConsumer) {
        SharedRingBuffer::new(BufferCapacity::try_new(capacity).expect("valid capacity")).split()
    }

    #[test]
    fn test_halves_see_each_other() {
        let (producer, mut consumer) = shared(64);
        assert!(producer.append(b"abc"));
        assert_eq!(consumer.used_bytes(), 3);
        assert_eq!(consumer.read_byte(), Some(b'a'));

        assert_eq!(consumer.consume_bytes(2), 2);
        assert_eq!(producer.used_bytes(), 1);
        assert_eq!(producer.free_bytes(), 63);
    }

    #[test]
    fn test_overflow_is_counted_and_harmless() {
        let (producer, consumer) = shared(64);
        assert!(producer.append(&[1u8; 64]));
        assert!(!producer.append(b"xy"));

        let stats = consumer.stats();
        assert_eq!(stats.overflow_events, 1);
        assert_eq!(stats.dropped_bytes.into_inner(), 2);
        assert_eq!(stats.total_appended, 64);
        assert_eq!(consumer.peek_byte(63), Some(1));
    }

    #[test]
    fn test_wraparound_across_halves() {
        let (producer, mut consumer) = shared(64);
        for round in 0u8..10 {
            let chunk = [round; 40];
            assert!(producer.append(&chunk), "round {round}");
            assert_eq!(consumer.copy_out(40).as_ref(), &chunk[..]);
            assert_eq!(consumer.consume_bytes(40), 40);
        }
        assert_eq!(consumer.stats().total_consumed, 400);
    }

    #[test]
    fn test_discard_until_keeps_later_bytes() {
        let (producer, mut consumer) = shared(64);
        assert!(producer.append(b"stale"));
        let mark = producer.stream_position();
        assert!(producer.append(b"fresh"));

        assert_eq!(consumer.discard_until(mark), 5);
        assert_eq!(consumer.copy_out(5).as_ref(), b"fresh");
    }

    #[test]
    fn test_discard_until_clamps_to_written() {
        let (producer, mut consumer) = shared(64);
        assert!(producer.append(b"abc"));
        assert_eq!(consumer.discard_until(1_000), 3);
        assert!(consumer.is_empty());
        assert_eq!(consumer.discard_until(0), 0);
    }

    #[test]
    fn test_concurrent_producer_and_consumer_preserve_order() {
        let (producer, mut consumer) = shared(256);
        let total: usize = 100_000;

        let writer = thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let end = (next + 37).min(total);
                let chunk: Vec<u8> = (next..end).map(|i| (i % 251) as u8).collect();
                if producer.append(&chunk) {
                    next = end;
                } else {
                    thread::yield_now();
                }
            }
        });

        let mut received = 0usize;
        while received < total {
            match consumer.peek_byte(0) {
                Some(byte) => {
                    assert_eq!(byte, (received % 251) as u8);
                    consumer.consume_bytes(1);
                    received += 1;
                }
                None => thread::yield_now(),
            }
        }

        writer.join().unwrap();
        assert!(consumer.is_empty());
    }
}
