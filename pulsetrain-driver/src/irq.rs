//! Interrupt-context completion handler
//!
//! The pulse generator raises two conditions per channel: a threshold
//! event when half of the active window has been consumed, and a
//! completion event when transmission meets the end-of-train marker.
//! Firmware decodes the peripheral's status register into unit masks
//! and dispatches here. Everything below runs in bounded time and
//! blocks only for the short critical sections around the shared
//! bookkeeping and the peripheral handle.

use portable_atomic::Ordering;

use pulsetrain_core::mask::UnitMask;
use pulsetrain_core::motion::MotionProfile;
use pulsetrain_core::traits::{PinLock, PulseChannel};

use crate::bank::StepperBank;

impl<C, L, M, const NUNITS: usize, const RING: usize> StepperBank<C, L, M, NUNITS, RING>
where
    C: PulseChannel,
    L: PinLock,
    M: MotionProfile,
{
    /// Threshold event: refill the half of `unit`'s window the hardware
    /// just freed, then wake the worker so it can replenish the ring.
    ///
    /// An empty ring copies nothing and sends no wake: an underrun is
    /// tolerated, not an error. Output only stalls if the worker truly
    /// has no more data, i.e. the end marker was already delivered.
    pub fn on_threshold(&self, unit: usize) {
        let slot = &self.slots[unit];
        let half = C::WINDOW / 2;
        let offset = slot.hw_offset.load(Ordering::Relaxed);

        let copied = self.channel.lock(|c| {
            let mut c = c.borrow_mut();
            let mut copied = 0;
            while copied < half {
                match slot.ring.try_pop() {
                    Some(entry) => {
                        c.load(unit, offset + copied, entry);
                        copied += 1;
                    }
                    None => break,
                }
            }
            copied
        });

        slot.hw_offset
            .store((offset + half) % C::WINDOW, Ordering::Relaxed);

        if copied > 0 {
            // A failed send only means wakes are already queued; the
            // worker will service this unit on the next threshold.
            let _ = self.wake.try_send(UnitMask::unit(unit));
        }
    }

    /// Completion event: the channel transmitted its end-of-train
    /// marker. Halts and resets the channel, retires the unit from the
    /// active set and wakes the blocked caller when it was the last.
    pub fn on_completion(&self, unit: usize) {
        self.channel.lock(|c| c.borrow_mut().halt(unit));
        self.sync.complete_unit(unit);
    }

    /// Dispatch one interrupt invocation. Both conditions can fire
    /// together; each unit's completion is handled before its (then
    /// stale) threshold.
    pub fn on_interrupt(&self, completed: UnitMask, threshold: UnitMask) {
        for unit in (completed | threshold).iter() {
            if unit >= NUNITS {
                continue;
            }
            if completed.contains(unit) {
                self.on_completion(unit);
            }
            if threshold.contains(unit) {
                self.on_threshold(unit);
            }
        }
    }
}
