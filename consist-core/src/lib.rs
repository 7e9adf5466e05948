//! Speed synchronization core for multi-headed DCC trains
//!
//! When several locomotives are coupled into one train, each of them
//! follows its own measured step/speed curve. This crate contains the
//! logic that keeps them running at matched speed:
//!
//! - Per-locomotive calibration curves and inverse lookups
//! - Synchronization table of compatible step combinations
//! - Train controller (ramping, feedback reconciliation, safety)
//! - Collaborator traits (locomotive handle, timer scheduler)
//! - Single-threaded timer queue
//! - Configuration type definitions and loading

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod scheduler;
pub mod speed;
pub mod train;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
