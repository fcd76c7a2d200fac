//! Capture buffer pool and the single-slot handoff
//!
//! The pool is a fixed set of [`NUM_BUFFERS`] buffers reused round-robin. The
//! capture task writes the current slot, publishes it to the [`Handoff`] and
//! moves on; the transmit task reads whatever the handoff points at.
//!
//! The handoff holds at most one entry. Publishing while an entry is still
//! unconsumed replaces it and the older buffer is dropped. Under backpressure
//! audio is lost rather than queued.
//!
//! Each slot sits behind an async mutex: if the producer wraps around to a
//! slot the consumer is still reading, the producer waits for it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::config::{BUFFER_SIZE, NUM_BUFFERS};

// ===================================================================
// Sample Buffer
// ===================================================================

/// Fixed-capacity raw PCM buffer with fill length
pub struct SampleBuffer {
    data: [u8; BUFFER_SIZE],
    len: usize,
    generation: u32,
}

impl SampleBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; BUFFER_SIZE],
            len: 0,
            generation: 0,
        }
    }

    /// The whole backing array, for the audio peripheral to fill
    pub fn spare_mut(&mut self) -> &mut [u8; BUFFER_SIZE] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(BUFFER_SIZE);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Generation of the publish that last filled this buffer
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn stamp(&mut self, generation: u32) {
        self.generation = generation;
    }

    /// Zero the contents and reset the fill length
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ===================================================================
// Buffer Pool
// ===================================================================

/// Index of one pool slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotRef(u8);

impl SlotRef {
    pub const fn new(index: usize) -> Self {
        Self((index % NUM_BUFFERS) as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

pub type Slot = Mutex<CriticalSectionRawMutex, SampleBuffer>;

pub struct BufferPool {
    slots: [Slot; NUM_BUFFERS],
    // Written by the capture task, rewound on power-on while capture is parked
    current: AtomicU8,
}

impl BufferPool {
    pub const fn new() -> Self {
        Self {
            slots: [const { Mutex::new(SampleBuffer::new()) }; NUM_BUFFERS],
            current: AtomicU8::new(0),
        }
    }

    /// The slot the producer writes next
    pub fn acquire_write_slot(&self) -> SlotRef {
        SlotRef(self.current.load(Ordering::Acquire))
    }

    /// Move the write target to the next slot, wrapping. Capture task only.
    pub fn advance(&self) -> SlotRef {
        let next = SlotRef::new(self.acquire_write_slot().index() + 1);
        self.current.store(next.0, Ordering::Release);
        next
    }

    pub fn slot(&self, slot: SlotRef) -> &Slot {
        &self.slots[slot.index()]
    }

    /// Rewind to slot 0 and zero every buffer that is not in use
    pub fn reset(&self) {
        for slot in &self.slots {
            if let Ok(mut buffer) = slot.try_lock() {
                buffer.clear();
            }
        }
        self.current.store(0, Ordering::Release);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// ===================================================================
// Handoff
// ===================================================================

/// A published buffer: which slot, how many bytes, and which publish
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadyBuffer {
    pub slot: SlotRef,
    pub len: usize,
    pub generation: u32,
}

const EMPTY: u64 = u64::MAX;

impl ReadyBuffer {
    // generation:32 | slot:16 | len:16 -- a slot index never reaches 0xffff,
    // so no entry encodes to EMPTY
    const fn encode(self) -> u64 {
        ((self.generation as u64) << 32) | ((self.slot.0 as u64) << 16) | (self.len as u64 & 0xffff)
    }

    const fn decode(word: u64) -> Option<Self> {
        if word == EMPTY {
            return None;
        }
        Some(Self {
            slot: SlotRef(((word >> 16) & 0xffff) as u8),
            len: (word & 0xffff) as usize,
            generation: (word >> 32) as u32,
        })
    }
}

/// Single-slot, non-blocking, lock-free mailbox between capture and transmit
pub struct Handoff {
    entry: AtomicU64,
    generation: AtomicU32,
    overwritten: AtomicU32,
    published: Signal<CriticalSectionRawMutex, ()>,
}

impl Handoff {
    pub const fn new() -> Self {
        Self {
            entry: AtomicU64::new(EMPTY),
            generation: AtomicU32::new(0),
            overwritten: AtomicU32::new(0),
            published: Signal::new(),
        }
    }

    /// Store `(slot, len)`, replacing any unconsumed entry, and wake the consumer
    pub fn publish(&self, slot: SlotRef, len: usize) -> ReadyBuffer {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        let ready = ReadyBuffer {
            slot,
            len: len.min(BUFFER_SIZE),
            generation,
        };
        let previous = self.entry.swap(ready.encode(), Ordering::AcqRel);
        if let Some(dropped) = ReadyBuffer::decode(previous) {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Handoff: slot {} (gen {}) overwritten before consumption",
                dropped.slot.index(),
                dropped.generation
            );
        }
        self.published.signal(());
        ready
    }

    /// Read and clear the entry
    pub fn try_take(&self) -> Option<ReadyBuffer> {
        ReadyBuffer::decode(self.entry.swap(EMPTY, Ordering::AcqRel))
    }

    /// Read the entry without clearing it
    pub fn peek(&self) -> Option<ReadyBuffer> {
        ReadyBuffer::decode(self.entry.load(Ordering::Acquire))
    }

    /// Clear the entry only if it is still exactly `consumed`.
    ///
    /// Returns false if a newer publish replaced it in the meantime.
    pub fn complete(&self, consumed: ReadyBuffer) -> bool {
        self.entry
            .compare_exchange(consumed.encode(), EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_current(&self, ready: ReadyBuffer) -> bool {
        self.entry.load(Ordering::Acquire) == ready.encode()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.load(Ordering::Acquire) == EMPTY
    }

    pub fn clear(&self) {
        self.entry.store(EMPTY, Ordering::Release);
        self.published.reset();
    }

    /// Buffers dropped because a newer publish replaced them
    pub fn dropped(&self) -> u32 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Suspend until an entry is present
    pub async fn wait_ready(&self) -> ReadyBuffer {
        loop {
            if let Some(ready) = self.peek() {
                return ready;
            }
            self.published.wait().await;
        }
    }

    /// Suspend until an entry other than `seen` is present
    pub async fn wait_newer(&self, seen: ReadyBuffer) -> ReadyBuffer {
        loop {
            match self.peek() {
                Some(ready) if ready != seen => return ready,
                _ => self.published.wait().await,
            }
        }
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_on_empty_handoff_returns_nothing() {
        let handoff = Handoff::new();
        assert!(handoff.try_take().is_none());
        assert!(handoff.is_empty());
    }

    #[test]
    fn publish_then_take_delivers_exactly_once() {
        let handoff = Handoff::new();
        let ready = handoff.publish(SlotRef::new(1), 2048);
        assert_eq!(handoff.try_take(), Some(ready));
        assert_eq!(handoff.try_take(), None);
        assert_eq!(handoff.dropped(), 0);
    }

    #[test]
    fn second_publish_replaces_the_first() {
        let handoff = Handoff::new();
        let first = handoff.publish(SlotRef::new(0), 100);
        let second = handoff.publish(SlotRef::new(1), 200);

        assert_ne!(first.generation, second.generation);
        assert_eq!(handoff.try_take(), Some(second));
        assert_eq!(handoff.try_take(), None);
        assert_eq!(handoff.dropped(), 1);
    }

    #[test]
    fn interleaved_publish_and_take_never_holds_two_entries() {
        let handoff = Handoff::new();
        let mut delivered = 0;
        for round in 0..20usize {
            let ready = handoff.publish(SlotRef::new(round), round * 10);
            if round % 3 == 0 {
                assert_eq!(handoff.try_take(), Some(ready));
                delivered += 1;
            }
            assert!(handoff.peek().map_or(true, |p| p == ready));
        }
        // 7 taken, 13 left behind; the last one is still pending
        assert_eq!(delivered, 7);
        assert_eq!(handoff.dropped(), 12);
        assert!(!handoff.is_empty());
    }

    #[test]
    fn complete_only_clears_the_consumed_entry() {
        let handoff = Handoff::new();
        let consumed = handoff.publish(SlotRef::new(2), 64);
        assert!(handoff.complete(consumed));
        assert!(handoff.is_empty());

        let stale = handoff.publish(SlotRef::new(0), 64);
        let newer = handoff.publish(SlotRef::new(1), 64);
        assert!(!handoff.complete(stale));
        assert_eq!(handoff.peek(), Some(newer));
    }

    #[test]
    fn same_slot_republished_is_told_apart_by_generation() {
        let handoff = Handoff::new();
        let first = handoff.publish(SlotRef::new(0), 64);
        // Producer wrapped all the way around to slot 0 again
        handoff.publish(SlotRef::new(1), 64);
        handoff.publish(SlotRef::new(2), 64);
        let again = handoff.publish(SlotRef::new(0), 64);

        assert_eq!(first.slot, again.slot);
        assert!(!handoff.is_current(first));
        assert!(!handoff.complete(first));
        assert!(handoff.complete(again));
    }

    #[test]
    fn wait_ready_returns_published_entry() {
        let handoff = Handoff::new();
        let ready = handoff.publish(SlotRef::new(1), 10);
        assert_eq!(embassy_futures::block_on(handoff.wait_ready()), ready);
    }

    #[test]
    fn pool_round_robin_wraps() {
        let pool = BufferPool::new();
        assert_eq!(pool.acquire_write_slot().index(), 0);
        assert_eq!(pool.advance().index(), 1);
        assert_eq!(pool.advance().index(), 2);
        assert_eq!(pool.advance().index(), 0);
    }

    #[test]
    fn slot_lengths_are_bounded_by_capacity() {
        let mut buffer = SampleBuffer::new();
        buffer.set_len(BUFFER_SIZE + 10);
        assert_eq!(buffer.len(), BUFFER_SIZE);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
