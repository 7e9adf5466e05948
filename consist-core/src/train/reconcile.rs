//! Manual input reconciliation
//!
//! When an operator turns the throttle of a single member, the train
//! follows by snapping that request to the nearest table entry. If the
//! snap would visibly push the throttle back against the operator's hand,
//! the member is left alone for a moment instead of being re-commanded at
//! once.

use crate::config::ReconcileConfig;
use crate::speed::TableIndex;
use crate::traits::Step;

/// Decide whether re-commanding a snapped member should wait
///
/// - `old`: step last commanded to the member
/// - `requested`: step the member now reports
/// - `matched`: the member's step in the closest table entry
/// - `matched_index` / `committed_index`: table positions of the match and
///   of the entry the train currently runs at
///
/// Delays when the snap reverts the direction the operator is moving in
/// by at most `step_threshold` steps, or when the match lies within
/// `index_proximity` of the committed entry (the train would not change).
pub fn should_delay(
    config: &ReconcileConfig,
    old: Step,
    requested: Step,
    matched: Step,
    matched_index: TableIndex,
    committed_index: TableIndex,
) -> bool {
    let snap = matched - requested;
    let moving_up = requested > old;
    let moving_down = requested < old;

    let reverts = ((moving_up && snap < 0) || (moving_down && snap > 0))
        && snap.abs() <= config.step_threshold;
    let stalls = (matched_index - committed_index).abs() < config.index_proximity;

    reverts || stalls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ReconcileConfig {
        ReconcileConfig::default()
    }

    #[test]
    fn test_snap_back_against_user_delays() {
        // User went 40 -> 49, table only has 48
        assert!(should_delay(&cfg(), 40, 49, 48, 11, 9));
        // User went 40 -> 33, table only has 36
        assert!(should_delay(&cfg(), 40, 33, 36, 7, 9));
    }

    #[test]
    fn test_snap_along_user_does_not_delay() {
        // Rounded further in the direction the user moves
        assert!(!should_delay(&cfg(), 40, 43, 44, 10, 9));
        assert!(!should_delay(&cfg(), 40, 37, 36, 8, 9));
    }

    #[test]
    fn test_large_snap_does_not_delay() {
        assert!(!should_delay(&cfg(), 10, 30, 26, 6, 2));
    }

    #[test]
    fn test_match_on_committed_entry_delays() {
        assert!(should_delay(&cfg(), 40, 42, 44, 9, 9));
    }

    #[test]
    fn test_thresholds_are_overridable() {
        let wide = ReconcileConfig {
            step_threshold: 5,
            index_proximity: 2,
            ..ReconcileConfig::default()
        };
        assert!(should_delay(&wide, 10, 30, 26, 6, 2));
        assert!(should_delay(&wide, 40, 43, 44, 10, 9));
    }
}
