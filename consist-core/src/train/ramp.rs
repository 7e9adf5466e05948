//! Speed ramp timing
//!
//! The train speeds up or brakes one table entry at a time. The pause
//! before each step is the time a real train needs to cover the speed
//! difference between the two entries at the configured rate.

use crate::speed::fuzzy;
use crate::speed::TableIndex;

/// Current ramp state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampState {
    /// Holding the committed entry
    #[default]
    Idle,
    /// Walking the table upwards
    Accelerating,
    /// Walking the table downwards
    Braking,
}

impl RampState {
    /// Table index change applied by the next tick
    pub fn index_step(self) -> TableIndex {
        match self {
            RampState::Idle => 0,
            RampState::Accelerating => 1,
            RampState::Braking => -1,
        }
    }

    /// Check if a tick is expected
    pub fn is_ramping(self) -> bool {
        self != RampState::Idle
    }
}

/// Milliseconds needed to change speed by `delta_speed` at `rate`
///
/// `rate` is in speed units per second. A rate of 0 (or below) means the
/// change happens at once.
pub fn tick_interval_ms(delta_speed: f64, rate: f64) -> u32 {
    if !(rate > 0.0) {
        return 0;
    }
    fuzzy::ceil_u32(fuzzy::abs(delta_speed) / rate * 1000.0)
}

/// Start point of the tick currently pending
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct RampOrigin {
    /// When the tick was scheduled
    pub started_ms: u64,
    /// Speed the train had at that moment
    pub speed: f64,
}

impl RampOrigin {
    /// Estimated train speed at `now_ms`
    ///
    /// Moves from the origin speed toward `toward` at `rate` and never
    /// overshoots it.
    pub fn speed_at(&self, now_ms: u64, rate: f64, toward: f64) -> f64 {
        let elapsed_s = now_ms.saturating_sub(self.started_ms) as f64 / 1000.0;
        let travelled = elapsed_s * rate.max(0.0);

        if toward >= self.speed {
            (self.speed + travelled).min(toward)
        } else {
            (self.speed - travelled).max(toward)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_intervals() {
        assert_eq!(tick_interval_ms(0.10 - 0.00, 0.0115), 8696);
        assert_eq!(tick_interval_ms(0.22 - 0.10, 0.0115), 10435);
        // 7826.09 rounds up
        assert_eq!(tick_interval_ms(0.31 - 0.22, 0.0115), 7827);
    }

    #[test]
    fn test_interval_ignores_sign() {
        assert_eq!(
            tick_interval_ms(-0.05, 0.01),
            tick_interval_ms(0.05, 0.01)
        );
    }

    #[test]
    fn test_zero_rate_is_instant() {
        assert_eq!(tick_interval_ms(0.5, 0.0), 0);
        assert_eq!(tick_interval_ms(0.5, -1.0), 0);
    }

    #[test]
    fn test_index_step() {
        assert_eq!(RampState::Idle.index_step(), 0);
        assert_eq!(RampState::Accelerating.index_step(), 1);
        assert_eq!(RampState::Braking.index_step(), -1);
        assert!(!RampState::Idle.is_ramping());
        assert!(RampState::Braking.is_ramping());
    }

    #[test]
    fn test_speed_at_accelerating() {
        let origin = RampOrigin {
            started_ms: 1_000,
            speed: 0.10,
        };
        // Half a second at 0.02/s
        assert!((origin.speed_at(1_500, 0.02, 0.2) - 0.11).abs() < 1e-12);
        // Clamped to the next entry
        assert_eq!(origin.speed_at(60_000, 0.02, 0.2), 0.2);
        // Clock before origin
        assert_eq!(origin.speed_at(500, 0.02, 0.2), 0.10);
    }

    #[test]
    fn test_speed_at_braking() {
        let origin = RampOrigin {
            started_ms: 0,
            speed: 0.10,
        };
        assert!((origin.speed_at(2_000, 0.01, 0.05) - 0.08).abs() < 1e-12);
        assert_eq!(origin.speed_at(10_000, 0.01, 0.05), 0.05);
    }
}
