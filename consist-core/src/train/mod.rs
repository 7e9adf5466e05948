//! Train control
//!
//! Drives a set of coupled locomotives as one train: ramps the shared
//! table index at a physical acceleration rate, reconciles manual input
//! on any single member, and refuses to release the train while it moves.

pub mod controller;
pub mod ramp;
pub mod reconcile;

pub use controller::{MemberError, MemberItem, TrainController};
pub use ramp::{tick_interval_ms, RampState};
pub use reconcile::should_delay;
