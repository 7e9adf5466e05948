//! Locomotive handle implementations
//!
//! This crate provides concrete implementations of the collaborator
//! traits defined in consist-core:
//!
//! - Echo matching of sent commands against command station replies
//! - Simulated locomotive with a lossy, delayed command channel

#![no_std]
#![deny(unsafe_code)]

pub mod locomotive;
