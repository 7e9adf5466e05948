//! Configuration types
//!
//! Tuning of the synchronization table, the speed ramp and the feedback
//! reconciliation. Stored as TOML or as postcard binary data.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;
