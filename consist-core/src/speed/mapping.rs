//! Per-locomotive speed calibration
//!
//! A mapping stores the measured speed for every DCC step of one
//! locomotive. A speed of 0 at a step is real data: the motor has not
//! overcome its start voltage yet.

use heapless::String;

use super::fuzzy;
use crate::traits::{Address, Step, MAX_STEP};

/// Number of calibrated steps (1..=126)
pub const SPEED_STEPS: usize = 126;

/// Maximum stored name length
pub const MAX_NAME_LEN: usize = 32;

/// Immutable step → speed calibration of one locomotive
///
/// Inverse lookups binary-search the curve and therefore assume it is
/// ascending. Measured curves can contain small dips; those produce a
/// slightly wrong step, never a panic.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedMapping {
    /// Display name (truncated to `MAX_NAME_LEN` bytes)
    name: String<MAX_NAME_LEN>,
    /// Decoder address the curve was measured on
    address: Address,
    /// Speed for step N stored at index N - 1
    speeds: [f64; SPEED_STEPS],
}

impl Default for SpeedMapping {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: 0,
            speeds: [0.0; SPEED_STEPS],
        }
    }
}

impl SpeedMapping {
    /// Create a mapping from a measured speed array
    pub fn new(name: &str, address: Address, speeds: [f64; SPEED_STEPS]) -> Self {
        Self {
            name: truncated_name(name),
            address,
            speeds,
        }
    }

    /// Create a mapping by evaluating `f` for every step 1..=126
    pub fn from_fn(name: &str, address: Address, mut f: impl FnMut(Step) -> f64) -> Self {
        let mut speeds = [0.0; SPEED_STEPS];
        for (i, speed) in speeds.iter_mut().enumerate() {
            *speed = f(i as Step + 1);
        }
        Self::new(name, address, speeds)
    }

    /// Get the display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the decoder address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the raw speed array (index = step - 1)
    pub fn speeds(&self) -> &[f64; SPEED_STEPS] {
        &self.speeds
    }

    /// Get the calibrated speed for a step
    ///
    /// Steps outside 1..=126 (stop, emergency stop) have speed 0.
    pub fn speed_for_step(&self, step: Step) -> f64 {
        if step <= 0 || step > MAX_STEP {
            return 0.0;
        }
        self.speeds[step as usize - 1]
    }

    /// Get the speed at the highest step
    pub fn max_speed(&self) -> f64 {
        self.speed_for_step(MAX_STEP)
    }

    /// Lowest step whose speed is at or above `speed`
    ///
    /// Returns 0 when even step 126 is slower.
    pub fn step_at_or_above(&self, speed: f64) -> Step {
        // Count of leading steps strictly slower than `speed`
        let idx = self.speeds.partition_point(|&s| s < speed);
        if idx == SPEED_STEPS {
            0
        } else {
            idx as Step + 1
        }
    }

    /// Highest step whose speed is at or below `speed`
    ///
    /// Returns 0 when even step 1 is faster.
    pub fn step_at_or_below(&self, speed: f64) -> Step {
        // Count of leading steps not faster than `speed`
        self.speeds.partition_point(|&s| s <= speed) as Step
    }

    /// Check whether a step has a moving speed
    pub fn is_moving_at(&self, step: Step) -> bool {
        !fuzzy::fuzzy_is_null(self.speed_for_step(step))
    }
}

/// Copy as much of `name` as fits, never splitting a character
fn truncated_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
