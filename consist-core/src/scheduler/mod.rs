//! Timer event loop
//!
//! A manual-clock timer queue implementing the [`Scheduler`] trait.
//! Firmware and host applications advance the clock from their own time
//! source; tests advance it explicitly.
//!
//! [`Scheduler`]: crate::traits::Scheduler

pub mod queue;

pub use queue::{FiredTimer, TimerQueue, MAX_PENDING_TIMERS};
