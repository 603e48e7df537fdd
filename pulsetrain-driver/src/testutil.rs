//! In-memory hardware doubles shared by the driver tests

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use pulsetrain_core::motion::{MotionConstraints, MotionProfile};
use pulsetrain_core::traits::{
    ChannelError, PinLock, PinLockError, PinRole, PulseChannel, StepPins,
};
use pulsetrain_core::waveform::PulseEntry;

pub(crate) const WINDOW: usize = 8;
pub(crate) const NUNITS: usize = 4;
pub(crate) const RING: usize = 64;

/// Observable state of the fake pulse-generator peripheral.
#[derive(Default)]
pub(crate) struct HwState {
    /// Per-channel transmission window. Unloaded slots read as zero,
    /// i.e. as end-of-train markers, just like cleared hardware memory.
    pub windows: [[PulseEntry; WINDOW]; NUNITS],
    pub armed: [bool; NUNITS],
    pub halts: [u32; NUNITS],
    pub configured: [Option<(StepPins, u8)>; NUNITS],
    pub direction: [Option<bool>; NUNITS],
    pub fail_configure: bool,
}

pub(crate) type SharedHw = Arc<Mutex<HwState>>;

pub(crate) fn shared_hw() -> SharedHw {
    Arc::new(Mutex::new(HwState::default()))
}

pub(crate) struct MockChannel(pub(crate) SharedHw);

impl PulseChannel for MockChannel {
    const WINDOW: usize = WINDOW;

    fn configure(
        &mut self,
        channel: usize,
        pins: StepPins,
        clock_divider: u8,
    ) -> Result<(), ChannelError> {
        let mut hw = self.0.lock().unwrap();
        if hw.fail_configure {
            return Err(ChannelError::InvalidPin);
        }
        if channel >= NUNITS {
            return Err(ChannelError::InvalidChannel);
        }
        hw.configured[channel] = Some((pins, clock_divider));
        Ok(())
    }

    fn load(&mut self, channel: usize, index: usize, entry: PulseEntry) {
        self.0.lock().unwrap().windows[channel][index] = entry;
    }

    fn arm(&mut self, channel: usize) {
        self.0.lock().unwrap().armed[channel] = true;
    }

    fn halt(&mut self, channel: usize) {
        let mut hw = self.0.lock().unwrap();
        hw.armed[channel] = false;
        hw.halts[channel] += 1;
    }

    fn set_direction(&mut self, channel: usize, forward: bool) {
        self.0.lock().unwrap().direction[channel] = Some(forward);
    }
}

/// Observable state of the fake pin arbitrator.
#[derive(Default)]
pub(crate) struct PinState {
    pub held: Vec<(usize, u8, PinRole)>,
    /// Pins that refuse to be acquired, simulating another owner.
    pub refuse: Vec<u8>,
}

pub(crate) type SharedPins = Arc<Mutex<PinState>>;

pub(crate) fn shared_pins() -> SharedPins {
    Arc::new(Mutex::new(PinState::default()))
}

pub(crate) struct MockPins(pub(crate) SharedPins);

impl PinLock for MockPins {
    fn acquire(&mut self, owner: usize, pin: u8, role: PinRole) -> Result<(), PinLockError> {
        let mut state = self.0.lock().unwrap();
        if state.refuse.contains(&pin) || state.held.iter().any(|h| h.1 == pin) {
            return Err(PinLockError { pin });
        }
        state.held.push((owner, pin, role));
        Ok(())
    }

    fn release(&mut self, owner: usize, pin: u8) {
        self.0
            .lock()
            .unwrap()
            .held
            .retain(|h| !(h.0 == owner && h.1 == pin));
    }
}

thread_local! {
    /// Motion samples drawn on the current thread. Each test runs its
    /// whole pipeline on one thread, so this isolates tests from each
    /// other.
    static MOTION_SAMPLES: Cell<u32> = const { Cell::new(0) };
}

pub(crate) fn motion_samples() -> u32 {
    MOTION_SAMPLES.with(|c| c.get())
}

pub(crate) fn reset_motion_samples() {
    MOTION_SAMPLES.with(|c| c.set(0));
}

/// Constant-rate profile that counts how many samples were drawn.
pub(crate) struct CountingProfile {
    interval: f64,
}

impl MotionProfile for CountingProfile {
    fn prepare(constraints: &MotionConstraints) -> Self {
        Self {
            interval: (constraints.units_per_step / constraints.target_speed) as f64,
        }
    }

    fn next_interval(&mut self) -> f64 {
        MOTION_SAMPLES.with(|c| c.set(c.get() + 1));
        self.interval
    }
}
