//! Driver error kinds
//!
//! All errors are detected synchronously in the setup/move boundary
//! calls and returned before any hardware state is mutated. The worker
//! and the completion handler never surface errors; a buffer underrun is
//! a stall, not a failure.

use crate::traits::{ChannelError, PinLockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Reserved: ring and table storage is allocated statically, so
    /// this kind is currently never returned.
    NotEnoughMemory,
    /// Unit id out of range.
    InvalidUnit,
    /// Every unit slot is already configured.
    NoMoreUnits,
    /// Operation on a unit that was never set up.
    UnitNotSetup,
    /// Pin outside the routable range.
    InvalidPin,
    /// Reserved; no direction validation is currently performed.
    InvalidDirection,
    /// Reserved; no acceleration validation is currently performed.
    InvalidAcceleration,
    /// A required pin is held by another owner.
    PinLocked(PinLockError),
    /// The peripheral rejected the channel configuration.
    Channel(ChannelError),
}

impl From<PinLockError> for Error {
    fn from(e: PinLockError) -> Self {
        Error::PinLocked(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}
