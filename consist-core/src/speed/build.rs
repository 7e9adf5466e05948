//! Synchronization table construction
//!
//! Locomotive 0 is the driver. For every driver step the other members
//! are searched depth-first, each one only inside the step window whose
//! speeds fall in the agreement band around the driver speed. Partial
//! tuples whose speed spread already exceeds the tolerance are pruned, so
//! the search stays close to linear in practice instead of 126^N.

use heapless::Vec;

use super::fuzzy;
use super::mapping::SpeedMapping;
use super::table::{Entry, SyncTable, MAX_MEMBERS, MAX_TABLE_ENTRIES};
use crate::traits::{Step, MAX_STEP};

/// A step tuple found by the search
#[derive(Debug, Clone)]
struct Candidate {
    steps: Vec<Step, MAX_MEMBERS>,
    avg_speed: f64,
    /// Fastest minus slowest member speed
    spread: f64,
}

/// Depth-first search state for one driver step
struct Search<'a> {
    mappings: &'a [&'a SpeedMapping],
    tolerance: f64,
    /// Partial tuple being explored
    steps: Vec<Step, MAX_MEMBERS>,
    /// Speeds of the partial tuple
    speeds: Vec<f64, MAX_MEMBERS>,
    /// Best complete tuple for the current driver step
    best: Option<Candidate>,
}

impl<'a> Search<'a> {
    fn new(mappings: &'a [&'a SpeedMapping], tolerance: f64) -> Self {
        let mut steps = Vec::new();
        let mut speeds = Vec::new();
        for _ in mappings {
            let _ = steps.push(0);
            let _ = speeds.push(0.0);
        }

        Self {
            mappings,
            tolerance,
            steps,
            speeds,
            best: None,
        }
    }

    /// Find the tuple with the smallest spread for `driver_step`
    fn run(&mut self, driver_step: Step) -> Option<Candidate> {
        let speed = self.mappings[0].speed_for_step(driver_step);
        self.best = None;
        self.steps[0] = driver_step;
        self.speeds[0] = speed;

        self.descend(1, speed - self.tolerance, speed + self.tolerance, speed, speed);
        self.best.take()
    }

    fn descend(&mut self, member: usize, band_lo: f64, band_hi: f64, min_so_far: f64, max_so_far: f64) {
        if member == self.mappings.len() {
            self.emit(max_so_far - min_so_far);
            return;
        }

        let mapping = self.mappings[member];
        let first = mapping.step_at_or_above(band_lo);
        let last = mapping.step_at_or_below(band_hi);
        if first == 0 || last == 0 {
            return;
        }

        for step in first..=last {
            let speed = mapping.speed_for_step(step);
            let lo = min_so_far.min(speed);
            let hi = max_so_far.max(speed);
            if hi - lo > self.tolerance {
                continue;
            }

            self.steps[member] = step;
            self.speeds[member] = speed;
            self.descend(member + 1, band_lo, band_hi, lo, hi);
        }
    }

    fn emit(&mut self, spread: f64) {
        // First tuple wins ties
        if let Some(best) = &self.best {
            if best.spread <= spread {
                return;
            }
        }

        let sum: f64 = self.speeds.iter().sum();
        self.best = Some(Candidate {
            steps: self.steps.clone(),
            avg_speed: sum / self.speeds.len() as f64,
            spread,
        });
    }
}

/// Collapse runs of candidates sharing `member`'s step to their best one
fn keep_best_per_step(candidates: &mut Vec<Candidate, MAX_TABLE_ENTRIES>, member: usize) {
    let all = core::mem::take(candidates);

    for candidate in all {
        match candidates.last_mut() {
            Some(last) if last.steps[member] == candidate.steps[member] => {
                if candidate.spread < last.spread {
                    *last = candidate;
                }
            }
            _ => {
                let _ = candidates.push(candidate);
            }
        }
    }
}

/// Check that `candidate` can follow `last` without breaking table order
fn extends(last: Option<&Entry>, candidate: &Candidate) -> bool {
    let Some(last) = last else {
        return true;
    };

    candidate.avg_speed > last.avg_speed
        && !fuzzy::fuzzy_eq(candidate.avg_speed, last.avg_speed)
        && last.steps != candidate.steps
        && last
            .steps
            .iter()
            .zip(candidate.steps.iter())
            .all(|(prev, next)| next >= prev)
}

impl SyncTable {
    /// Build a table for coupled locomotives
    ///
    /// `mappings[i]` is the curve of member `i`; member 0 drives the
    /// search. Every entry keeps all member speeds within `tolerance` of
    /// each other. Fewer than two (or more than `MAX_MEMBERS`) mappings
    /// give an empty table.
    pub fn build(mappings: &[&SpeedMapping], tolerance: f64) -> Self {
        let count = mappings.len();
        if !(2..=MAX_MEMBERS).contains(&count) || !(tolerance >= 0.0) {
            debug!("Sync table not built: {} members", count);
            return Self::new();
        }

        // The slowest locomotive caps the train
        let max_train_speed = mappings
            .iter()
            .map(|m| m.max_speed())
            .fold(f64::INFINITY, f64::min)
            + tolerance;

        let driver = mappings[0];
        let mut last_driver_step = driver.step_at_or_below(max_train_speed);
        if last_driver_step == 0 {
            last_driver_step = MAX_STEP;
        }

        let mut search = Search::new(mappings, tolerance);
        let mut candidates: Vec<Candidate, MAX_TABLE_ENTRIES> = Vec::new();

        for driver_step in 1..=last_driver_step {
            if !driver.is_moving_at(driver_step) {
                continue;
            }
            if let Some(candidate) = search.run(driver_step) {
                // At most one candidate per driver step, capacity suffices
                let _ = candidates.push(candidate);
            }
        }

        // Make every member's step unique within the table
        for member in 0..count {
            keep_best_per_step(&mut candidates, member);
        }

        let mut table = SyncTable {
            entries: Vec::new(),
            member_count: count,
        };

        for candidate in candidates {
            if !extends(table.entries.last(), &candidate) {
                // Only reachable with non-monotonic calibration data
                debug!(
                    "Dropping out-of-order candidate at {} (spread {})",
                    candidate.avg_speed,
                    candidate.spread
                );
                continue;
            }

            let _ = table.entries.push(Entry {
                steps: candidate.steps,
                avg_speed: candidate.avg_speed,
            });
        }

        info!(
            "Built sync table: {} members, {} entries, top speed {}",
            count,
            table.entries.len(),
            table.entry_at(table.last_index()).avg_speed()
        );

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::{DEFAULT_SYNC_TOLERANCE, NULL_TABLE_ENTRY};
    use crate::testing::{linear, with_start};
    use proptest::prelude::*;

    fn assert_invariants(table: &SyncTable) -> Result<(), TestCaseError> {
        for pair in table.entries().windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            prop_assert!(next.avg_speed() > prev.avg_speed());
            prop_assert_ne!(prev.steps(), next.steps());
            for member in 0..table.member_count() {
                prop_assert!(next.step_for(member) >= prev.step_for(member));
            }
        }
        Ok(())
    }

    #[test]
    fn test_matched_pair_has_unique_driver_step() {
        let a = linear("A", 3, 0.005);
        // 0.05 exactly at step 12
        let b = SpeedMapping::from_fn("B", 4, |step| step as f64 * 0.05 / 12.0);

        let table = SyncTable::build(&[&a, &b], DEFAULT_SYNC_TOLERANCE);

        let with_a10: std::vec::Vec<_> = table
            .entries()
            .iter()
            .filter(|e| e.step_for(0) == 10)
            .collect();
        assert_eq!(with_a10.len(), 1);
        assert_eq!(with_a10[0].step_for(1), 12);
        assert!((with_a10[0].avg_speed() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_coarse_member_collapses_driver_steps() {
        // Each step of B covers four steps of A
        let a = linear("fine", 3, 0.002);
        let b = linear("coarse", 4, 0.008);

        let table = SyncTable::build_default(&[&a, &b]);

        assert!(!table.is_empty());
        for (j, entry) in table.entries().iter().enumerate().take(30) {
            let b_step = j as Step + 1;
            assert_eq!(entry.steps(), &[4 * b_step, b_step]);
            assert!((entry.avg_speed() - 0.008 * b_step as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_slowest_member_caps_table() {
        let fast = linear("fast", 3, 0.01);
        let slow = linear("slow", 4, 0.004);

        let table = SyncTable::build_default(&[&fast, &slow]);
        let top = table.entry_at(table.last_index());

        assert!(top.avg_speed() <= slow.max_speed() + DEFAULT_SYNC_TOLERANCE);
        // Fast driver never needs to go beyond roughly 40% throttle
        assert!(top.step_for(0) <= 52);
    }

    #[test]
    fn test_start_voltage_offsets() {
        let a = with_start("A", 3, 1, 0.006);
        let b = with_start("B", 4, 9, 0.006);

        let table = SyncTable::build_default(&[&a, &b]);
        let first = &table.entries()[0];

        // B only moves from step 9, so the table starts there
        assert!(first.step_for(1) >= 9);
        for entry in table.entries() {
            assert_eq!(entry.step_for(1) - entry.step_for(0), 8);
        }
    }

    #[test]
    fn test_three_members() {
        let a = linear("A", 3, 0.004);
        let b = linear("B", 4, 0.005);
        let c = with_start("C", 5, 3, 0.0045);

        let table = SyncTable::build_default(&[&a, &b, &c]);
        assert_eq!(table.member_count(), 3);
        assert!(!table.is_empty());
        assert_invariants(&table).unwrap();

        for entry in table.entries() {
            let speeds = [
                a.speed_for_step(entry.step_for(0)),
                b.speed_for_step(entry.step_for(1)),
                c.speed_for_step(entry.step_for(2)),
            ];
            let max = speeds.iter().cloned().fold(f64::MIN, f64::max);
            let min = speeds.iter().cloned().fold(f64::MAX, f64::min);
            assert!(max - min <= DEFAULT_SYNC_TOLERANCE + 1e-12);
        }
    }

    #[test]
    fn test_no_agreement_gives_empty_table() {
        // B is always far faster than A
        let a = linear("A", 3, 0.0001);
        let b = with_start("B", 4, 1, 0.5);

        let table = SyncTable::build_default(&[&a, &b]);
        assert!(table.is_empty());
        assert_eq!(table.closest_match(0, 40).0, NULL_TABLE_ENTRY);
    }

    fn curve() -> impl Strategy<Value = SpeedMapping> {
        (1i16..20, 0.001f64..0.012, 0.0f64..0.00002).prop_map(|(start, slope, bend)| {
            SpeedMapping::from_fn("curve", 3, move |step| {
                if step < start {
                    0.0
                } else {
                    let n = (step - start + 1) as f64;
                    n * slope + n * n * bend
                }
            })
        })
    }

    proptest! {
        #[test]
        fn table_is_ordered_and_unique(curves in prop::collection::vec(curve(), 2..=3)) {
            let refs: std::vec::Vec<&SpeedMapping> = curves.iter().collect();
            let table = SyncTable::build_default(&refs);
            assert_invariants(&table)?;
        }

        #[test]
        fn closest_match_is_nearest(
            curves in prop::collection::vec(curve(), 2..=3),
            member in 0usize..3,
            step in 1i16..=126,
        ) {
            let refs: std::vec::Vec<&SpeedMapping> = curves.iter().collect();
            let table = SyncTable::build_default(&refs);
            let member = member % table.member_count().max(1);

            let (idx, entry) = table.closest_match(member, step);
            if table.is_empty() {
                prop_assert_eq!(idx, NULL_TABLE_ENTRY);
            } else {
                prop_assert_eq!(table.entry_at(idx), entry);
                let best = (entry.step_for(member) - step).abs();
                for other in table.entries() {
                    prop_assert!(best <= (other.step_for(member) - step).abs());
                }
            }
        }

        #[test]
        fn zero_step_is_always_null(curves in prop::collection::vec(curve(), 2..=3), member in 0usize..3) {
            let refs: std::vec::Vec<&SpeedMapping> = curves.iter().collect();
            let table = SyncTable::build_default(&refs);
            let (idx, entry) = table.closest_match(member, 0);
            prop_assert_eq!(idx, NULL_TABLE_ENTRY);
            prop_assert!(entry.is_null());
        }
    }
}
