//! Approximate comparisons for measured speeds
//!
//! Calibration data comes from sensors, so exact float equality is never
//! meaningful. The helpers here avoid `std` float methods so the crate
//! stays `no_std`.

/// Relative tolerance for speed equality
pub const SPEED_EPSILON: f64 = 1e-9;

/// Absolute value
#[inline]
pub fn abs(x: f64) -> f64 {
    if x < 0.0 {
        -x
    } else {
        x
    }
}

/// Compare two speeds, tolerating measurement rounding
#[inline]
pub fn fuzzy_eq(a: f64, b: f64) -> bool {
    let scale = abs(a).max(abs(b)).max(1.0);
    abs(a - b) <= SPEED_EPSILON * scale
}

/// Check whether a speed is zero, tolerating measurement rounding
#[inline]
pub fn fuzzy_is_null(x: f64) -> bool {
    abs(x) <= SPEED_EPSILON
}

/// Round a non-negative value up to the next integer
///
/// Negative and NaN inputs give 0, values beyond `u32::MAX` saturate.
#[inline]
pub fn ceil_u32(x: f64) -> u32 {
    if !(x > 0.0) {
        return 0;
    }
    let truncated = x as u32;
    if (truncated as f64) < x {
        truncated.saturating_add(1)
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzy_eq() {
        assert!(fuzzy_eq(0.1 + 0.2, 0.3));
        assert!(!fuzzy_eq(0.3, 0.3001));
        assert!(fuzzy_is_null(0.0));
        assert!(fuzzy_is_null(-1e-12));
        assert!(!fuzzy_is_null(0.001));
    }

    #[test]
    fn test_ceil() {
        assert_eq!(ceil_u32(0.0), 0);
        assert_eq!(ceil_u32(-3.5), 0);
        assert_eq!(ceil_u32(f64::NAN), 0);
        assert_eq!(ceil_u32(2.0), 2);
        assert_eq!(ceil_u32(2.0001), 3);
        assert_eq!(ceil_u32(1e20), u32::MAX);
    }
}
