//! Pulse waveform descriptors and the step encoder
//!
//! The pulse generator consumes fixed-format items of two phases, each a
//! 1-bit output level plus a 15-bit duration in hardware ticks. One motor
//! step is a short high pulse followed by the rest of the inter-step
//! interval low. Intervals too long for a single item are continued with
//! all-low items, and the unencoded remainder is carried across
//! buffer-full boundaries so a step can be finished on a later pass.

use crate::ring::PulseRing;

/// Duration of one hardware tick in nanoseconds (80 MHz source, divider 2).
pub const NANOS_PER_TICK: u32 = 25;

/// Clock divider programmed into the peripheral channel at setup.
pub const CLOCK_DIVIDER: u8 = 2;

/// Width of the high phase of a step pulse: 1 µs.
pub const PULSE_WIDTH_TICKS: u32 = 1_000 / NANOS_PER_TICK;

/// Largest duration a single descriptor phase can hold (15-bit field).
pub const MAX_PHASE_TICKS: u32 = 0x7FFF;

/// One waveform item: two (level, duration) phases packed as
/// `duration0:15 | level0:1 | duration1:15 | level1:1`.
///
/// The all-zero item is the end-of-train marker: transmission stops at
/// the first zero-duration phase the hardware meets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseEntry(u32);

impl PulseEntry {
    /// End-of-train marker.
    pub const END: Self = Self(0);

    /// Pack two phases into an item. Durations are masked to 15 bits.
    pub const fn new(level0: bool, duration0: u16, level1: bool, duration1: u16) -> Self {
        let d0 = (duration0 as u32) & MAX_PHASE_TICKS;
        let d1 = (duration1 as u32) & MAX_PHASE_TICKS;
        Self(d0 | ((level0 as u32) << 15) | (d1 << 16) | ((level1 as u32) << 31))
    }

    /// Reconstruct an item from its raw hardware word.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw hardware word, ready to be written into transmission memory.
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn level0(self) -> bool {
        self.0 & (1 << 15) != 0
    }

    pub const fn duration0(self) -> u16 {
        (self.0 & MAX_PHASE_TICKS) as u16
    }

    pub const fn level1(self) -> bool {
        self.0 & (1 << 31) != 0
    }

    pub const fn duration1(self) -> u16 {
        ((self.0 >> 16) & MAX_PHASE_TICKS) as u16
    }

    /// Whether this item is the end-of-train marker.
    pub const fn is_end(self) -> bool {
        self.0 == 0
    }

    /// Total ticks covered by both phases.
    pub const fn ticks(self) -> u32 {
        self.duration0() as u32 + self.duration1() as u32
    }
}

/// Convert a motion-profile sample in seconds to hardware ticks.
///
/// Floors at nanosecond resolution, matching the tick grid of the
/// peripheral clock.
pub fn interval_ticks(seconds: f64) -> u32 {
    let nanos = (seconds * 1_000_000_000.0) as u64;
    (nanos / NANOS_PER_TICK as u64).min(u32::MAX as u64) as u32
}

/// Outcome of one encoding burst against a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeOutcome {
    /// The in-progress step is fully encoded.
    Complete,
    /// The ring filled before the step was exhausted; the remainder is
    /// kept pending for a later pass.
    RingFull,
}

/// Splits one inter-step interval into hardware descriptors.
///
/// `begin_step` arms the encoder with a fresh interval; `encode_into`
/// then emits descriptors until the interval is exhausted or the ring
/// fills. The first descriptor of a step carries the fixed-width high
/// pulse; every continuation descriptor is all-low. Descriptor durations
/// always sum to the requested interval exactly.
///
/// A new motion-profile sample must only be requested once `step_done`
/// reports true, so the profile is advanced exactly once per physical
/// step.
#[derive(Debug, Clone)]
pub struct StepEncoder {
    pulse_ticks: u32,
    pending: u32,
    first: bool,
}

impl StepEncoder {
    /// Create an encoder with the given high-pulse width in ticks.
    ///
    /// Intervals fed to `begin_step` must exceed the pulse width.
    pub const fn new(pulse_ticks: u32) -> Self {
        Self {
            pulse_ticks,
            pending: 0,
            first: false,
        }
    }

    /// Drop any partially encoded step (used when a move is re-primed).
    pub fn reset(&mut self) {
        self.pending = 0;
        self.first = false;
    }

    /// True when no partially encoded step remains.
    pub fn step_done(&self) -> bool {
        self.pending == 0
    }

    /// Start encoding a new step covering `ticks` hardware ticks.
    pub fn begin_step(&mut self, ticks: u32) {
        debug_assert!(ticks > self.pulse_ticks);
        self.pending = ticks;
        self.first = true;
    }

    /// Emit descriptors for the in-progress step until it is exhausted
    /// or `ring` is full.
    pub fn encode_into<const N: usize>(&mut self, ring: &PulseRing<N>) -> EncodeOutcome {
        while self.pending > 0 {
            if ring.is_full() {
                return EncodeOutcome::RingFull;
            }
            let entry = self.next_entry();
            // Cannot fail: the encoder is the sole producer and the ring
            // had a free slot above.
            let _ = ring.try_push(entry);
        }
        EncodeOutcome::Complete
    }

    /// Build the next descriptor and consume its ticks from the pending
    /// remainder.
    fn next_entry(&mut self) -> PulseEntry {
        if self.first {
            // Leading edge: high for the pulse width, then low for as
            // much of the interval as one phase can hold.
            self.first = false;
            let rest = self.pending.saturating_sub(self.pulse_ticks);
            let low = rest.min(MAX_PHASE_TICKS);
            self.pending = rest - low;
            PulseEntry::new(true, self.pulse_ticks as u16, false, low as u16)
        } else if self.pending < 2 * MAX_PHASE_TICKS {
            // Final continuation: split the remainder across both phases
            // so the descriptor exhausts it exactly.
            let d0 = self.pending >> 1;
            let d1 = self.pending - d0;
            self.pending = 0;
            PulseEntry::new(false, d0 as u16, false, d1 as u16)
        } else {
            self.pending -= 2 * MAX_PHASE_TICKS;
            PulseEntry::new(
                false,
                MAX_PHASE_TICKS as u16,
                false,
                MAX_PHASE_TICKS as u16,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Encode a full step into an oversized ring and collect the items.
    fn encode_all(ticks: u32) -> Vec<PulseEntry> {
        let ring: PulseRing<4096> = PulseRing::new();
        let mut enc = StepEncoder::new(PULSE_WIDTH_TICKS);
        enc.begin_step(ticks);
        assert_eq!(enc.encode_into(&ring), EncodeOutcome::Complete);
        let mut out = Vec::new();
        while let Some(e) = ring.try_pop() {
            out.push(e);
        }
        out
    }

    #[test]
    fn test_entry_packing() {
        let e = PulseEntry::new(true, 40, false, 960);
        assert!(e.level0());
        assert_eq!(e.duration0(), 40);
        assert!(!e.level1());
        assert_eq!(e.duration1(), 960);
        assert_eq!(e.ticks(), 1000);
        assert_eq!(PulseEntry::from_raw(e.raw()), e);
        assert!(!e.is_end());
        assert!(PulseEntry::END.is_end());
    }

    #[test]
    fn test_short_interval_single_entry() {
        // 1 ms step period fits in one descriptor.
        let entries = encode_all(40_000);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].level0());
        assert_eq!(entries[0].duration0() as u32, PULSE_WIDTH_TICKS);
        assert_eq!(entries[0].ticks(), 40_000);
    }

    #[test]
    fn test_long_interval_continuations_are_low() {
        let entries = encode_all(200_000);
        assert!(entries.len() > 1);
        assert!(entries[0].level0());
        for e in &entries[1..] {
            assert!(!e.level0());
            assert!(!e.level1());
        }
        let total: u32 = entries.iter().map(|e| e.ticks()).sum();
        assert_eq!(total, 200_000);
    }

    #[test]
    fn test_interval_ticks_floors() {
        // 1 ms -> 40_000 ticks exactly
        assert_eq!(interval_ticks(0.001), 40_000);
        // One nanosecond short of a tick boundary floors down
        assert_eq!(interval_ticks(0.000_000_049), 1);
        assert_eq!(interval_ticks(0.0), 0);
    }

    #[test]
    fn test_resume_after_ring_full() {
        // Ring with 3 usable slots; a 200k-tick step needs 4 descriptors.
        let ring: PulseRing<4> = PulseRing::new();
        let mut enc = StepEncoder::new(PULSE_WIDTH_TICKS);
        enc.begin_step(200_000);

        assert_eq!(enc.encode_into(&ring), EncodeOutcome::RingFull);
        assert!(!enc.step_done());

        let mut entries = Vec::new();
        while let Some(e) = ring.try_pop() {
            entries.push(e);
        }
        assert_eq!(enc.encode_into(&ring), EncodeOutcome::Complete);
        assert!(enc.step_done());
        while let Some(e) = ring.try_pop() {
            entries.push(e);
        }

        let total: u32 = entries.iter().map(|e| e.ticks()).sum();
        assert_eq!(total, 200_000);
        // Only the very first descriptor carries the high pulse.
        assert!(entries[0].level0());
        assert!(entries[1..].iter().all(|e| !e.level0() && !e.level1()));
    }

    proptest! {
        #[test]
        fn prop_encoded_ticks_sum_exactly(ticks in (PULSE_WIDTH_TICKS + 1)..50_000_000u32) {
            let entries = encode_all(ticks);
            let total: u64 = entries.iter().map(|e| e.ticks() as u64).sum();
            prop_assert_eq!(total, ticks as u64);
        }

        #[test]
        fn prop_phase_durations_bounded(ticks in (PULSE_WIDTH_TICKS + 1)..50_000_000u32) {
            for e in encode_all(ticks) {
                prop_assert!(e.duration0() as u32 <= MAX_PHASE_TICKS);
                prop_assert!(e.duration1() as u32 <= MAX_PHASE_TICKS);
            }
        }

        #[test]
        fn prop_first_high_phase_is_pulse_width(ticks in (PULSE_WIDTH_TICKS + 1)..50_000_000u32) {
            let entries = encode_all(ticks);
            prop_assert!(entries[0].level0());
            prop_assert_eq!(entries[0].duration0() as u32, PULSE_WIDTH_TICKS);
            prop_assert!(!entries[0].level1());
        }
    }
}
