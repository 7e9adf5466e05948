//! Configuration type definitions

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::speed::{TableIndex, DEFAULT_SYNC_TOLERANCE};
use crate::traits::Step;

/// Current configuration format version
pub const CONFIG_VERSION: u8 = 1;

/// Default acceleration in speed units per second
pub const DEFAULT_ACCELERATION: f64 = 0.0115;

/// Default deceleration in speed units per second
pub const DEFAULT_DECELERATION: f64 = 0.0115;

/// Default hold-off before re-commanding a member after manual input
pub const DEFAULT_DELAYED_APPLY_MS: u32 = 300;

/// Default snap distance (in steps) treated as "moving against the user"
///
/// Empirically tuned on real locomotives.
pub const DEFAULT_DELAY_STEP_THRESHOLD: Step = 3;

/// Default table distance treated as "no real change"
///
/// Empirically tuned on real locomotives.
pub const DEFAULT_DELAY_INDEX_PROXIMITY: TableIndex = 1;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// TOML parsing failed
    TomlParse,
    /// Binary deserialization failed
    Deserialize,
    /// Binary serialization failed (buffer too small)
    Serialize,
    /// Config version mismatch
    VersionMismatch,
    /// A value is out of range
    Invalid,
}

/// Synchronization table tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Maximum speed difference between members of one entry
    pub tolerance: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_SYNC_TOLERANCE,
        }
    }
}

/// Speed ramp tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RampConfig {
    /// Speed units per second while speeding up (0 = jump)
    pub acceleration: f64,
    /// Speed units per second while braking (0 = jump)
    pub deceleration: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            acceleration: DEFAULT_ACCELERATION,
            deceleration: DEFAULT_DECELERATION,
        }
    }
}

/// Feedback reconciliation tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconcileConfig {
    /// Hold-off before a snapped member is re-commanded
    pub delay_ms: u32,
    /// Snap distance (steps) that counts as reverting the user's input
    pub step_threshold: Step,
    /// Table distance below which a snap counts as "no change"
    pub index_proximity: TableIndex,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAYED_APPLY_MS,
            step_threshold: DEFAULT_DELAY_STEP_THRESHOLD,
            index_proximity: DEFAULT_DELAY_INDEX_PROXIMITY,
        }
    }
}

/// Complete train controller configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrainConfig {
    /// Config format version
    pub version: u8,
    /// Table construction
    pub sync: SyncConfig,
    /// Speed ramp
    pub ramp: RampConfig,
    /// Feedback reconciliation
    pub reconcile: ReconcileConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sync: SyncConfig::default(),
            ramp: RampConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Check that all values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if !finite_non_negative(self.sync.tolerance)
            || !finite_non_negative(self.ramp.acceleration)
            || !finite_non_negative(self.ramp.deceleration)
            || self.reconcile.step_threshold < 0
            || self.reconcile.index_proximity < 0
        {
            return Err(ConfigError::Invalid);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.sync.tolerance, DEFAULT_SYNC_TOLERANCE);
        assert_eq!(config.reconcile.step_threshold, 3);
        assert_eq!(config.reconcile.index_proximity, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrainConfig::default();
        config.ramp.acceleration = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::Invalid));

        let mut config = TrainConfig::default();
        config.sync.tolerance = f64::NAN;
        assert_eq!(config.validate(), Err(ConfigError::Invalid));

        let mut config = TrainConfig::default();
        config.reconcile.step_threshold = -2;
        assert_eq!(config.validate(), Err(ConfigError::Invalid));
    }
}
