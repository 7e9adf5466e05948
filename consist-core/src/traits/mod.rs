//! Collaborator traits
//!
//! These traits define the interface between the train logic and the
//! outside world: locomotive handles that talk to a command station, and
//! the timer service that drives ramps and delayed commands.

pub mod locomotive;
pub mod scheduler;

pub use locomotive::{
    Address, ChangeEvent, Direction, ListenerId, Locomotive, Step, EMERGENCY_STOP, MAX_STEP,
};
pub use scheduler::{Scheduler, TimerError, TimerKind, TimerToken};
