//! Unit registry and boundary operations
//!
//! A [`StepperBank`] is a fixed table of stepper units sharing one
//! pulse-generator peripheral, addressed by hardware channel id. Slots
//! are allocated once and reused across moves; `setup` claims a slot,
//! `move_by` stages a train, `start`/`stop` run it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use micromath::F32Ext;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use pulsetrain_core::error::Error;
use pulsetrain_core::mask::{UnitMask, MAX_UNITS};
use pulsetrain_core::motion::{MotionConstraints, MotionProfile};
use pulsetrain_core::ring::PulseRing;
use pulsetrain_core::traits::{PinLock, PinRole, PulseChannel, StepPins};
use pulsetrain_core::waveform::{StepEncoder, CLOCK_DIVIDER, PULSE_WIDTH_TICKS};

use crate::sync::SyncCore;

/// Depth of the worker wake queue. Deep enough that interrupt-context
/// sends do not fail in practice; a full queue drops the wake.
pub(crate) const WAKE_QUEUE_DEPTH: usize = 32;

/// Highest routable GPIO number for the step output.
const MAX_STEP_PIN: u8 = 31;

/// Static configuration for one unit, applied at setup.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitConfig {
    pub pins: StepPins,
    /// Minimum speed in physical units per second.
    pub min_speed: f32,
    /// Maximum speed in physical units per second.
    pub max_speed: f32,
    /// Maximum acceleration in units per second squared.
    pub max_accel: f32,
    /// Steps per physical unit (includes microstepping and gearing).
    pub steps_per_unit: f32,
}

/// Per-move kinematic request, forwarded to the motion profile.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Kinematics {
    pub initial_speed: f32,
    pub target_speed: f32,
    pub acceleration: f32,
    pub jerk: f32,
}

/// Unit state fixed at setup time. Speed and acceleration limits are
/// stored for the motion collaborator; no validation is currently
/// performed against them.
#[derive(Clone, Copy)]
pub(crate) struct SlotConfig {
    pub(crate) pins: StepPins,
    pub(crate) min_speed: f32,
    pub(crate) max_speed: f32,
    pub(crate) max_accel: f32,
    pub(crate) steps_per_unit: f32,
    pub(crate) units_per_step: f32,
}

/// Encoder-side state for the train in progress. The worker is the only
/// steady-state user; `move_by` rewrites it while the unit is idle.
pub(crate) struct Feed<M> {
    pub(crate) motion: Option<M>,
    pub(crate) encoder: StepEncoder,
    /// Steps not yet fully encoded; 0 means only the end marker may
    /// still be owed.
    pub(crate) steps_remaining: u32,
    pub(crate) end_queued: bool,
}

pub(crate) struct Slot<M, const RING: usize> {
    /// Written once under the setup lock, read-only afterwards.
    pub(crate) config: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<SlotConfig>>>,
    pub(crate) feed: BlockingMutex<CriticalSectionRawMutex, RefCell<Feed<M>>>,
    pub(crate) ring: PulseRing<RING>,
    /// Window position of the next half-window refill; owned by the
    /// completion handler while transmitting.
    pub(crate) hw_offset: AtomicUsize,
    pub(crate) dir_forward: AtomicBool,
    /// A move staged this unit and the worker has not armed it yet.
    pub(crate) arm_pending: AtomicBool,
    /// The hardware began transmitting this train (or a stop claimed
    /// the unit before it could; either way the worker must not arm).
    pub(crate) started: AtomicBool,
    pub(crate) is_setup: AtomicBool,
}

impl<M, const RING: usize> Slot<M, RING> {
    fn new() -> Self {
        Self {
            config: BlockingMutex::new(RefCell::new(None)),
            feed: BlockingMutex::new(RefCell::new(Feed {
                motion: None,
                encoder: StepEncoder::new(PULSE_WIDTH_TICKS),
                steps_remaining: 0,
                end_queued: false,
            })),
            ring: PulseRing::new(),
            hw_offset: AtomicUsize::new(0),
            dir_forward: AtomicBool::new(false),
            arm_pending: AtomicBool::new(false),
            started: AtomicBool::new(false),
            is_setup: AtomicBool::new(false),
        }
    }
}

/// Fixed table of stepper units over one pulse-generator peripheral.
///
/// `NUNITS` is the number of hardware channels, `RING` the per-unit ring
/// capacity in descriptors (power of two, larger than the channel
/// window).
pub struct StepperBank<C, L, M, const NUNITS: usize, const RING: usize>
where
    C: PulseChannel,
    L: PinLock,
    M: MotionProfile,
{
    pub(crate) slots: [Slot<M, RING>; NUNITS],
    /// The peripheral handle, shared between worker, handler and
    /// caller-side stop under the critical section.
    pub(crate) channel: BlockingMutex<CriticalSectionRawMutex, RefCell<C>>,
    /// Serializes setup calls and owns the pin arbitration collaborator.
    setup_lock: Mutex<CriticalSectionRawMutex, L>,
    pub(crate) sync: SyncCore,
    /// ISR/start -> worker wake queue, carrying unit masks.
    pub(crate) wake: Channel<CriticalSectionRawMutex, UnitMask, WAKE_QUEUE_DEPTH>,
}

impl<C, L, M, const NUNITS: usize, const RING: usize> StepperBank<C, L, M, NUNITS, RING>
where
    C: PulseChannel,
    L: PinLock,
    M: MotionProfile,
{
    pub fn new(channel: C, pin_lock: L) -> Self {
        assert!(NUNITS <= MAX_UNITS);
        assert!(C::WINDOW >= 2 && C::WINDOW.is_power_of_two());
        // The ring must be able to prime a full window before arming.
        assert!(RING > C::WINDOW);
        Self {
            slots: core::array::from_fn(|_| Slot::new()),
            channel: BlockingMutex::new(RefCell::new(channel)),
            setup_lock: Mutex::new(pin_lock),
            sync: SyncCore::new(),
            wake: Channel::new(),
        }
    }

    /// Claim the next free unit slot: lock its pins, program the
    /// peripheral channel and record the unit configuration.
    ///
    /// Serialized against concurrent setups. Pins claimed before a
    /// later failure are released again before returning.
    pub async fn setup(&self, config: UnitConfig) -> Result<usize, Error> {
        if config.pins.step > MAX_STEP_PIN {
            return Err(Error::InvalidPin);
        }

        let mut pins = self.setup_lock.lock().await;

        let unit = self
            .slots
            .iter()
            .position(|s| !s.is_setup.load(Ordering::Acquire))
            .ok_or(Error::NoMoreUnits)?;

        pins.acquire(unit, config.pins.step, PinRole::Step)?;
        if let Err(e) = pins.acquire(unit, config.pins.dir, PinRole::Direction) {
            pins.release(unit, config.pins.step);
            return Err(e.into());
        }

        let configured = self
            .channel
            .lock(|c| c.borrow_mut().configure(unit, config.pins, CLOCK_DIVIDER));
        if let Err(e) = configured {
            pins.release(unit, config.pins.dir);
            pins.release(unit, config.pins.step);
            return Err(e.into());
        }

        let slot = &self.slots[unit];
        slot.config.lock(|cfg| {
            *cfg.borrow_mut() = Some(SlotConfig {
                pins: config.pins,
                min_speed: config.min_speed,
                max_speed: config.max_speed,
                max_accel: config.max_accel,
                steps_per_unit: config.steps_per_unit,
                units_per_step: 1.0 / config.steps_per_unit,
            });
        });
        slot.ring.reset();
        slot.is_setup.store(true, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!(
            "stepper{}: step pin {}, dir pin {}",
            unit,
            config.pins.step,
            config.pins.dir
        );

        Ok(unit)
    }

    /// Stage a move of `distance` physical units (sign selects the
    /// direction): re-prime the motion profile, derive the step budget
    /// and reset the unit's buffering state.
    ///
    /// The unit must be fully idle; a move while it is transmitting is
    /// undefined.
    pub fn move_by(&self, unit: usize, distance: f32, kinematics: Kinematics) -> Result<(), Error> {
        if unit >= NUNITS {
            return Err(Error::InvalidUnit);
        }
        let slot = &self.slots[unit];
        if !slot.is_setup.load(Ordering::Acquire) {
            return Err(Error::UnitNotSetup);
        }
        let Some((steps_per_unit, units_per_step)) = slot.config.lock(|cfg| {
            cfg.borrow()
                .as_ref()
                .map(|c| (c.steps_per_unit, c.units_per_step))
        }) else {
            return Err(Error::UnitNotSetup);
        };

        let forward = distance >= 0.0;
        slot.dir_forward.store(forward, Ordering::Relaxed);

        let length = distance.abs();
        let constraints = MotionConstraints {
            initial_speed: kinematics.initial_speed,
            target_speed: kinematics.target_speed,
            acceleration: kinematics.acceleration,
            jerk: kinematics.jerk,
            distance: length,
            steps_per_unit,
            units_per_step,
        };
        let steps = (length * steps_per_unit).floor() as u32;

        slot.feed.lock(|feed| {
            let mut feed = feed.borrow_mut();
            feed.motion = Some(M::prepare(&constraints));
            feed.encoder.reset();
            feed.steps_remaining = steps;
            feed.end_queued = false;
        });
        slot.ring.reset();
        slot.hw_offset.store(0, Ordering::Relaxed);
        slot.started.store(false, Ordering::Relaxed);
        slot.arm_pending.store(true, Ordering::Release);

        Ok(())
    }

    /// Run every staged unit in `mask` and block until each one has
    /// completed its train or been stopped.
    ///
    /// One start may be in flight at a time; a second concurrent start
    /// is undefined.
    pub async fn start(&self, mask: UnitMask) {
        // Direction outputs settle before the first step edge.
        self.channel.lock(|c| {
            let mut c = c.borrow_mut();
            for unit in mask.iter() {
                c.set_direction(unit, self.slots[unit].dir_forward.load(Ordering::Relaxed));
            }
        });

        self.sync.begin(mask);
        self.wake.send(mask).await;
        self.sync.wait().await;
    }

    /// Forcibly halt every active unit in `mask`, regardless of
    /// buffered content. Asynchronous with respect to the worker and
    /// the completion handler; wakes the blocked `start` caller once no
    /// active units remain.
    pub fn stop(&self, mask: UnitMask) {
        self.sync.stop_units(mask, |unit| {
            let slot = &self.slots[unit];
            // Claim the unit so a worker pass that has not armed it yet
            // leaves it dead instead of starting a runaway train.
            slot.arm_pending.store(false, Ordering::Relaxed);
            slot.started.store(true, Ordering::Relaxed);
            self.channel.lock(|c| c.borrow_mut().halt(unit));
        });
    }

    /// The configuration a unit was set up with, if any.
    pub fn unit_config(&self, unit: usize) -> Option<UnitConfig> {
        if unit >= NUNITS {
            return None;
        }
        self.slots[unit].config.lock(|cfg| {
            cfg.borrow().as_ref().map(|c| UnitConfig {
                pins: c.pins,
                min_speed: c.min_speed,
                max_speed: c.max_speed,
                max_accel: c.max_accel,
                steps_per_unit: c.steps_per_unit,
            })
        })
    }

    /// Units currently transmitting.
    pub fn active_units(&self) -> UnitMask {
        self.sync.active()
    }

    /// True when no start cycle is in flight.
    pub fn is_idle(&self) -> bool {
        self.active_units().is_empty()
    }
}
