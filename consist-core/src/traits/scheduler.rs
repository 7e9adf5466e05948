//! Timer scheduling trait
//!
//! The controller never sleeps or spawns threads. It asks a scheduler to
//! fire a timer later and expects the surrounding event loop to call it
//! back with the token once the deadline passes.

/// Handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerToken(pub u32);

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Advance the speed ramp by one table entry
    AccelerationTick,
    /// Re-command a member whose feedback was held back
    DelayedApply {
        /// Member index within the train
        member: usize,
    },
}

/// Errors that can occur when scheduling timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// No free timer slot
    QueueFull,
}

/// Trait for single-threaded timer services
pub trait Scheduler {
    /// Current time in milliseconds
    fn now_ms(&self) -> u64;

    /// Fire a timer of `kind` after `delay_ms`
    ///
    /// Timers with the same deadline fire in submission order.
    fn schedule_after(&mut self, delay_ms: u32, kind: TimerKind) -> Result<TimerToken, TimerError>;

    /// Cancel a pending timer
    ///
    /// Cancelling an unknown or already fired token is a no-op.
    fn cancel(&mut self, token: TimerToken);
}
