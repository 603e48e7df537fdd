//! Multi-unit stepper pulse-train driver
//!
//! Feeds a hardware pulse-generator peripheral with pre-encoded waveform
//! descriptors so that step timing comes from hardware, not from CPU
//! loops. Three execution contexts cooperate per unit:
//!
//! - the caller: `setup`, `move_by`, then a blocking `start` over a unit
//!   mask, with `stop` as the only cancellation;
//! - the acceleration worker (`run`): converts motion-profile samples
//!   into descriptors and keeps every active unit's ring buffer topped
//!   up;
//! - the completion handler (`on_interrupt`): refills the hardware
//!   window from the ring on threshold events and retires units on
//!   end-of-train completion.
//!
//! Descriptors cross the worker/handler boundary through a lock-free
//! SPSC ring per unit; the only shared locking is the short critical
//! section around the start/stop bookkeeping and the peripheral handle.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bank;

mod irq;
mod sync;
mod worker;

#[cfg(test)]
pub(crate) mod testutil;
