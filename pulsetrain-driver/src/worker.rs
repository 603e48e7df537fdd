//! Acceleration worker
//!
//! A single long-lived task owns the producer side of every unit's ring
//! buffer and is the sole caller into the motion-profile collaborator.
//! It wakes on unit masks queued by `start` (initial fill) or by the
//! completion handler (half a window consumed), tops up each signaled
//! unit's ring, then arms any unit whose train was staged but not yet
//! transmitting.

use portable_atomic::Ordering;

use pulsetrain_core::mask::UnitMask;
use pulsetrain_core::motion::MotionProfile;
use pulsetrain_core::traits::{PinLock, PulseChannel};
use pulsetrain_core::waveform::{interval_ticks, EncodeOutcome, PulseEntry};

use crate::bank::StepperBank;

impl<C, L, M, const NUNITS: usize, const RING: usize> StepperBank<C, L, M, NUNITS, RING>
where
    C: PulseChannel,
    L: PinLock,
    M: MotionProfile,
{
    /// Worker event loop. Spawn exactly once; runs forever.
    pub async fn run(&self) -> ! {
        loop {
            let mask = self.wake.receive().await;
            self.service(mask);
        }
    }

    /// Drain one queued wake without an executor. Returns whether a
    /// wake was processed.
    pub fn poll_service(&self) -> bool {
        match self.wake.try_receive() {
            Ok(mask) => {
                self.service(mask);
                true
            }
            Err(_) => false,
        }
    }

    /// One worker pass over the signaled units: top up every ring, then
    /// arm freshly staged trains.
    pub fn service(&self, mask: UnitMask) {
        for unit in mask.iter() {
            if unit < NUNITS {
                self.fill(unit);
            }
        }
        for unit in mask.iter() {
            if unit < NUNITS {
                self.arm_if_pending(unit);
            }
        }
    }

    /// Encode motion-profile samples into `unit`'s ring until the ring
    /// is full or the train (including its end marker) is exhausted.
    fn fill(&self, unit: usize) {
        let slot = &self.slots[unit];
        slot.feed.lock(|feed| {
            let mut feed = feed.borrow_mut();
            loop {
                if feed.encoder.step_done() {
                    if feed.steps_remaining == 0 {
                        // Train encoded; the marker may still be owed if
                        // the ring was full when the last step finished.
                        if !feed.end_queued && slot.ring.try_push(PulseEntry::END).is_ok() {
                            feed.end_queued = true;
                        }
                        return;
                    }
                    // One profile sample per physical step, and only
                    // once the previous step is fully encoded.
                    let Some(motion) = feed.motion.as_mut() else {
                        return;
                    };
                    let interval = motion.next_interval();
                    feed.encoder.begin_step(interval_ticks(interval));
                }
                match feed.encoder.encode_into(&slot.ring) {
                    EncodeOutcome::RingFull => return,
                    EncodeOutcome::Complete => feed.steps_remaining -= 1,
                }
            }
        });
    }

    /// Prime the hardware window from the oldest ring entries and start
    /// transmission. A unit already transmitting is never re-armed; it
    /// is only refilled until it completes and a fresh move re-stages
    /// it.
    fn arm_if_pending(&self, unit: usize) {
        let slot = &self.slots[unit];
        if !slot.arm_pending.load(Ordering::Acquire) {
            return;
        }
        self.channel.lock(|c| {
            // Re-checked under the critical section: a stop may have
            // claimed the unit since the flag was read.
            if slot.started.load(Ordering::Acquire) {
                return;
            }
            let mut c = c.borrow_mut();
            let mut index = 0;
            while index < C::WINDOW {
                match slot.ring.try_pop() {
                    Some(entry) => {
                        c.load(unit, index, entry);
                        index += 1;
                    }
                    None => break,
                }
            }
            slot.hw_offset.store(0, Ordering::Relaxed);
            slot.started.store(true, Ordering::Relaxed);
            slot.arm_pending.store(false, Ordering::Relaxed);
            c.arm(unit);
        });
    }
}
