//! Pulse-generator peripheral contract

use crate::waveform::PulseEntry;

/// Pin assignment for one stepper unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPins {
    /// Step pulse output.
    pub step: u8,
    /// Direction output.
    pub dir: u8,
}

/// Errors raised by channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// The channel id has no hardware behind it.
    InvalidChannel,
    /// A pin cannot be routed to this peripheral.
    InvalidPin,
}

/// One multi-channel pulse-generator peripheral.
///
/// Each channel owns a fixed window of transmission memory holding
/// [`WINDOW`](Self::WINDOW) descriptors. Transmission wraps around the
/// window; the hardware raises a threshold event each time half the
/// window has been consumed and a completion event when it meets the
/// end-of-train marker.
///
/// Implementations are driven from both task and interrupt context, but
/// always under the driver's critical section, so methods may assume
/// exclusive access for their duration.
pub trait PulseChannel {
    /// Descriptor capacity of one channel's transmission window
    /// (power of two).
    const WINDOW: usize;

    /// Program a channel: route the pins, set the tick clock divider,
    /// idle the output low and enable the half-window threshold.
    fn configure(&mut self, channel: usize, pins: StepPins, clock_divider: u8)
        -> Result<(), ChannelError>;

    /// Write one descriptor into the channel's window at `index`.
    fn load(&mut self, channel: usize, index: usize, entry: PulseEntry);

    /// Begin transmitting from the start of the window.
    fn arm(&mut self, channel: usize);

    /// Stop transmission immediately and reset the channel's read state.
    fn halt(&mut self, channel: usize);

    /// Drive the channel's direction output.
    fn set_direction(&mut self, channel: usize, forward: bool);
}
