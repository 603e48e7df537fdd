//! Boundary contracts with the excluded hardware collaborators
//!
//! The pulse engine never touches registers or pins directly: the
//! pulse-generator peripheral sits behind [`PulseChannel`] and
//! electrical pin arbitration behind [`PinLock`]. Firmware crates
//! implement these for the actual hardware; tests implement them in
//! memory.

mod channel;
mod pins;

pub use channel::{ChannelError, PulseChannel, StepPins};
pub use pins::{PinLock, PinLockError, PinRole};
