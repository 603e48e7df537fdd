//! Single-producer/single-consumer pulse descriptor ring
//!
//! The acceleration worker is the only context that writes `head`; the
//! completion handler is the only context that writes `tail`. Each index
//! is published with release ordering and read by the other side with
//! acquire ordering, so descriptors cross the task/interrupt boundary
//! without a lock. Because a descriptor is a single `u32`, the slots are
//! plain atomic words and the whole ring needs no unsafe code.
//!
//! Occupancy semantics: the ring holds at most `N - 1` descriptors;
//! `head == tail` means empty, `(head + 1) % N == tail` means full.

use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::waveform::PulseEntry;

/// Fixed-capacity SPSC ring of pulse descriptors.
///
/// `N` must be a power of two (checked at compile time).
pub struct PulseRing<const N: usize> {
    slots: [AtomicU32; N],
    /// Next write index; producer-owned.
    head: AtomicUsize,
    /// Next read index; consumer-owned.
    tail: AtomicUsize,
}

impl<const N: usize> PulseRing<N> {
    const CAPACITY_OK: () = assert!(N.is_power_of_two() && N >= 2);
    const EMPTY_SLOT: AtomicU32 = AtomicU32::new(0);

    pub const fn new() -> Self {
        let _ = Self::CAPACITY_OK;
        Self {
            slots: [Self::EMPTY_SLOT; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Usable capacity (one slot is sacrificed to distinguish full from
    /// empty).
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Append a descriptor. Producer context only.
    ///
    /// Returns the descriptor back if the ring is full.
    pub fn try_push(&self, entry: PulseEntry) -> Result<(), PulseEntry> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & (N - 1);
        if next == self.tail.load(Ordering::Acquire) {
            return Err(entry);
        }
        self.slots[head].store(entry.raw(), Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Take the oldest descriptor. Consumer context only.
    pub fn try_pop(&self) -> Option<PulseEntry> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let raw = self.slots[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) & (N - 1), Ordering::Release);
        Some(PulseEntry::from_raw(raw))
    }

    /// Number of buffered descriptors.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & (N - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Discard all contents.
    ///
    /// Only valid while the unit is idle (no producer or consumer
    /// active); a move re-initializes its ring through this.
    pub fn reset(&self) {
        self.tail.store(0, Ordering::Relaxed);
        self.head.store(0, Ordering::Release);
    }
}

impl<const N: usize> Default for PulseRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
