//! Locomotive handle trait
//!
//! A locomotive handle abstracts over the command station connection
//! (Z21, LocoNet, simulator, ...). Commands are fire-and-forget: the only
//! acknowledgment is a later change notification.

use crate::speed::SpeedMapping;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// DCC decoder address
pub type Address = u16;

/// DCC speed step (0 = stop, 1..=126 = moving)
pub type Step = i16;

/// Highest DCC speed step in 128-step mode
pub const MAX_STEP: Step = 126;

/// Step value used to request an emergency stop
pub const EMERGENCY_STOP: Step = -1;

/// Locomotive travel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Cab-forward travel
    #[default]
    Forward,
    /// Reverse travel
    Reverse,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// Apply a member's invert flag
    ///
    /// Locomotives coupled back-to-back run in opposite decoder directions
    /// for the same train direction. The mapping is its own inverse, so the
    /// same call converts train direction to locomotive direction and back.
    pub fn resolve(self, invert: bool) -> Self {
        if invert {
            self.opposite()
        } else {
            self
        }
    }
}

/// Identifier of a change-event observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListenerId(pub u8);

/// Notification that a locomotive's reported step or direction changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChangeEvent {
    /// Address of the locomotive that changed
    pub address: Address,
    /// The change is the echo of a command sent through this handle
    pub is_echo: bool,
}

/// Trait for locomotive handles
///
/// Implementations forward commands to a command station and track the
/// state it reports back. They must be able to tell the echo of their own
/// command apart from a change made elsewhere (a handheld throttle, another
/// program), usually by matching replies against sent commands.
pub trait Locomotive {
    /// Get the decoder address
    fn address(&self) -> Address;

    /// Get the calibration curve of this locomotive
    fn speed_mapping(&self) -> &SpeedMapping;

    /// Get the step last reported by the command station
    fn reported_step(&self) -> Step;

    /// Get the direction last reported by the command station
    fn reported_direction(&self) -> Direction;

    /// Get the step of the most recent command
    fn last_commanded_step(&self) -> Step;

    /// Get the direction of the most recent command
    fn last_commanded_direction(&self) -> Direction;

    /// Send a speed command
    ///
    /// Fire-and-forget: the command may be dropped by the hardware channel.
    /// `EMERGENCY_STOP` requests an immediate stop.
    fn drive(&mut self, step: Step, direction: Direction);

    /// Start delivering change events to `listener`
    fn subscribe(&mut self, listener: ListenerId);

    /// Stop delivering change events to `listener`
    fn unsubscribe(&mut self, listener: ListenerId);
}
