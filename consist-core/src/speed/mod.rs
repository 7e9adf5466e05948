//! Speed calibration and synchronization
//!
//! A [`SpeedMapping`] is the measured curve of one locomotive. A
//! [`SyncTable`] combines several curves into the list of step tuples
//! that keep every coupled locomotive at (almost) the same speed.

mod build;
pub mod fuzzy;
pub mod mapping;
pub mod table;

pub use mapping::{SpeedMapping, MAX_NAME_LEN, SPEED_STEPS};
pub use table::{
    Entry, SpeedPoint, SyncTable, TableIndex, DEFAULT_SYNC_TOLERANCE, MAX_MEMBERS,
    MAX_TABLE_ENTRIES, NULL_TABLE_ENTRY,
};
