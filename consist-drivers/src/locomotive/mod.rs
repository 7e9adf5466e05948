//! Locomotive handles

pub mod echo;
pub mod sim;

pub use echo::{EchoMatcher, SentCommand, MAX_PENDING_COMMANDS};
pub use sim::{SimulatedLocomotive, COMMAND_QUEUE_LEN, MAX_LISTENERS};
