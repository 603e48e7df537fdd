//! Multi-unit start/stop synchronization
//!
//! Tracks which units are currently transmitting and wakes the caller
//! blocked in `start` once the last of them retires. The completion
//! handler and the forced-stop path mutate the same state, so both go
//! through the same short critical section; a lost wake or a double
//! decrement would otherwise be possible when a stop races a completion
//! interrupt.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use pulsetrain_core::mask::UnitMask;

struct State {
    /// Units currently transmitting.
    active: UnitMask,
    /// Population count of `active`.
    count: u8,
}

/// One start cycle at a time: Idle -> Armed (`begin`) -> Draining (bits
/// retire one by one) -> Idle (waiter released).
pub(crate) struct SyncCore {
    state: Mutex<CriticalSectionRawMutex, RefCell<State>>,
    /// Wakes the task blocked in `wait`. The signal's registered waker
    /// is the waiter; it is only pending while units are active.
    done: Signal<CriticalSectionRawMutex, ()>,
}

impl SyncCore {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                active: UnitMask::EMPTY,
                count: 0,
            })),
            done: Signal::new(),
        }
    }

    /// Record a start request for `mask` and reset the completion
    /// signal. A second start while one is in flight is undefined by
    /// contract and not detected here.
    pub(crate) fn begin(&self, mask: UnitMask) {
        self.done.reset();
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.active |= mask;
            s.count = s.active.count();
        });
    }

    /// Block until every unit recorded by `begin` has completed or been
    /// stopped.
    pub(crate) async fn wait(&self) {
        self.done.wait().await;
    }

    /// Completion-handler path: `unit` finished its train. Wakes the
    /// waiter when it was the last one out.
    pub(crate) fn complete_unit(&self, unit: usize) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if !s.active.contains(unit) {
                return;
            }
            s.active.remove(unit);
            s.count -= 1;
            if s.count == 0 {
                self.done.signal(());
            }
        });
    }

    /// Forced-stop path: invoke `halt` for every unit in both `mask`
    /// and the active set, clearing each bit as it is halted. Runs
    /// entirely inside the same critical section `complete_unit` uses.
    pub(crate) fn stop_units(&self, mask: UnitMask, mut halt: impl FnMut(usize)) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let stopping = mask & s.active;
            for unit in stopping.iter() {
                halt(unit);
                s.active.remove(unit);
                s.count -= 1;
            }
            if !stopping.is_empty() && s.count == 0 {
                self.done.signal(());
            }
        });
    }

    pub(crate) fn active(&self) -> UnitMask {
        self.state.lock(|s| s.borrow().active)
    }

    #[cfg(test)]
    pub(crate) fn signaled(&self) -> bool {
        self.done.signaled()
    }
}
