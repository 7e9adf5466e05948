//! Synchronization table
//!
//! An ordered list of step tuples, one step per coupled locomotive, each
//! predicted to run every member at matched speed. The position in this
//! list ("table index") is the unit of train speed: ramping means walking
//! the table one entry at a time.

use heapless::Vec;

use super::fuzzy;
use super::mapping::{SpeedMapping, SPEED_STEPS};
use crate::traits::Step;

/// Maximum locomotives in one train
pub const MAX_MEMBERS: usize = 4;

/// Maximum table entries (at most one per driver step)
pub const MAX_TABLE_ENTRIES: usize = SPEED_STEPS;

/// Default agreement window between member speeds
pub const DEFAULT_SYNC_TOLERANCE: f64 = 0.005;

/// Position within a [`SyncTable`]
pub type TableIndex = i32;

/// Table index meaning "stopped / no entry"
pub const NULL_TABLE_ENTRY: TableIndex = -1;

static NULL_ENTRY: Entry = Entry::NULL;

/// One step combination
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Entry {
    /// Step for each member, by member index
    pub(crate) steps: Vec<Step, MAX_MEMBERS>,
    /// Mean predicted speed of all members
    pub(crate) avg_speed: f64,
}

impl Default for Entry {
    fn default() -> Self {
        Self::NULL
    }
}

impl Entry {
    /// The "stopped" entry: every member at step 0
    pub const NULL: Entry = Entry {
        steps: Vec::new(),
        avg_speed: 0.0,
    };

    /// Create an entry from explicit steps and speed
    ///
    /// Steps beyond `MAX_MEMBERS` are ignored.
    pub fn new(steps: &[Step], avg_speed: f64) -> Self {
        let mut owned = Vec::new();
        for &step in steps.iter().take(MAX_MEMBERS) {
            let _ = owned.push(step);
        }
        Self {
            steps: owned,
            avg_speed,
        }
    }

    /// Step for member `member`, 0 if unknown
    pub fn step_for(&self, member: usize) -> Step {
        self.steps.get(member).copied().unwrap_or(0)
    }

    /// Steps of all members
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Mean predicted speed
    pub fn avg_speed(&self) -> f64 {
        self.avg_speed
    }

    /// Check if this is the "stopped" entry
    pub fn is_null(&self) -> bool {
        self.steps.iter().all(|&s| s == 0) && fuzzy::fuzzy_is_null(self.avg_speed)
    }
}

/// A committed or requested position in the table
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedPoint {
    /// Mean speed of the entry
    pub speed: f64,
    /// Index of the entry (`NULL_TABLE_ENTRY` when stopped)
    pub table_index: TableIndex,
}

impl Default for SpeedPoint {
    fn default() -> Self {
        Self::NULL
    }
}

impl SpeedPoint {
    /// Stopped
    pub const NULL: SpeedPoint = SpeedPoint {
        speed: 0.0,
        table_index: NULL_TABLE_ENTRY,
    };

    /// Create a speed point
    pub const fn new(speed: f64, table_index: TableIndex) -> Self {
        Self { speed, table_index }
    }

    /// Check if this point means "stopped"
    pub fn is_null(&self) -> bool {
        self.table_index == NULL_TABLE_ENTRY
    }
}

/// Ordered table of synchronized step combinations
///
/// Invariants:
/// - entries strictly ascending by average speed
/// - every member's step is non-decreasing from one entry to the next
/// - no two entries share the same step tuple
///
/// The table is built in one go from the members' mappings and never
/// edited afterwards. Any change in membership requires a rebuild.
#[derive(Debug, Clone, Default)]
pub struct SyncTable {
    /// Entries in ascending speed order
    pub(crate) entries: Vec<Entry, MAX_TABLE_ENTRIES>,
    /// Number of members the table was built for
    pub(crate) member_count: usize,
}

impl SyncTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            member_count: 0,
        }
    }

    /// Build a table with the default tolerance
    pub fn build_default(mappings: &[&SpeedMapping]) -> Self {
        Self::build(mappings, DEFAULT_SYNC_TOLERANCE)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of members the table was built for
    pub fn member_count(&self) -> usize {
        self.member_count
    }

    /// All entries in ascending speed order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Index of the fastest entry, `NULL_TABLE_ENTRY` if empty
    pub fn last_index(&self) -> TableIndex {
        self.entries.len() as TableIndex - 1
    }

    /// Get the entry at `index`
    ///
    /// `NULL_TABLE_ENTRY` and out-of-range indices give the null entry.
    pub fn entry_at(&self, index: TableIndex) -> &Entry {
        if index < 0 {
            return &NULL_ENTRY;
        }
        self.entries.get(index as usize).unwrap_or(&NULL_ENTRY)
    }

    /// Get the speed point for `index`
    ///
    /// Out-of-range indices give `SpeedPoint::NULL`.
    pub fn point_at(&self, index: TableIndex) -> SpeedPoint {
        if index < 0 || index as usize >= self.entries.len() {
            return SpeedPoint::NULL;
        }
        SpeedPoint::new(self.entry_at(index).avg_speed, index)
    }

    /// Find the entry whose step for `member` is closest to `step`
    ///
    /// Step 0 (and below) means stopped and always gives the null entry.
    /// On a tie between two entries the faster one wins. Steps above the
    /// table saturate at the fastest entry.
    pub fn closest_match(&self, member: usize, step: Step) -> (TableIndex, &Entry) {
        if step <= 0 || member >= self.member_count {
            return (NULL_TABLE_ENTRY, &NULL_ENTRY);
        }

        self.closest_by(step as f64, |e| e.step_for(member) as f64)
    }

    /// Find the fastest entry not faster than `speed`
    ///
    /// A fuzzy-equal entry counts as not faster. Zero or negative speed,
    /// or a speed below the first entry, gives the null entry. Speeds above
    /// the table saturate at the fastest entry.
    pub fn closest_match_speed(&self, speed: f64) -> (TableIndex, &Entry) {
        if speed <= 0.0 || fuzzy::fuzzy_is_null(speed) {
            return (NULL_TABLE_ENTRY, &NULL_ENTRY);
        }

        let below = self
            .entries
            .partition_point(|e| e.avg_speed < speed || fuzzy::fuzzy_eq(e.avg_speed, speed));
        match below.checked_sub(1) {
            Some(idx) => (idx as TableIndex, &self.entries[idx]),
            None => (NULL_TABLE_ENTRY, &NULL_ENTRY),
        }
    }

    /// Nearest-value scan
    ///
    /// Relies on `key` being non-decreasing along the table.
    fn closest_by(&self, target: f64, key: impl Fn(&Entry) -> f64) -> (TableIndex, &Entry) {
        let mut prev: Option<(usize, f64)> = None;

        for (i, entry) in self.entries.iter().enumerate() {
            let value = key(entry);
            if value == target {
                return (i as TableIndex, entry);
            }

            if value > target {
                if let Some((prev_idx, prev_value)) = prev {
                    if (target - prev_value) < (value - target) {
                        return (prev_idx as TableIndex, &self.entries[prev_idx]);
                    }
                }
                return (i as TableIndex, entry);
            }

            prev = Some((i, value));
        }

        match self.entries.last() {
            Some(last) => (self.last_index(), last),
            None => (NULL_TABLE_ENTRY, &NULL_ENTRY),
        }
    }
}
