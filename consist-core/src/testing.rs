//! Shared test fixtures: calibration curves, hand-made tables and a
//! recording locomotive handle.

use std::vec::Vec;

use crate::speed::{Entry, SpeedMapping, SyncTable};
use crate::traits::{Address, Direction, ListenerId, Locomotive, Step};

/// Curve rising by `per_step` for every step
pub(crate) fn linear(name: &str, address: Address, per_step: f64) -> SpeedMapping {
    SpeedMapping::from_fn(name, address, |step| step as f64 * per_step)
}

/// Curve standing still below `start`, then rising by `per_step`
pub(crate) fn with_start(name: &str, address: Address, start: Step, per_step: f64) -> SpeedMapping {
    SpeedMapping::from_fn(name, address, |step| {
        if step < start {
            0.0
        } else {
            (step - start + 1) as f64 * per_step
        }
    })
}

/// Table with explicit rows
pub(crate) fn table_from<const N: usize>(rows: &[([Step; N], f64)]) -> SyncTable {
    let mut table = SyncTable::new();
    table.member_count = N;
    for (steps, speed) in rows {
        table.entries.push(Entry::new(steps, *speed)).unwrap();
    }
    table
}

/// Locomotive handle that records every command
#[derive(Debug)]
pub(crate) struct MockLoco {
    pub mapping: SpeedMapping,
    pub reported_step: Step,
    pub reported_direction: Direction,
    pub sent: Vec<(Step, Direction)>,
    pub listeners: Vec<ListenerId>,
}

impl MockLoco {
    pub(crate) fn new(mapping: SpeedMapping) -> Self {
        Self {
            mapping,
            reported_step: 0,
            reported_direction: Direction::Forward,
            sent: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Most recent command, if any
    pub(crate) fn last_sent(&self) -> Option<(Step, Direction)> {
        self.sent.last().copied()
    }

    /// Simulate feedback from the command station
    pub(crate) fn report(&mut self, step: Step, direction: Direction) {
        self.reported_step = step;
        self.reported_direction = direction;
    }
}

impl Locomotive for MockLoco {
    fn address(&self) -> Address {
        self.mapping.address()
    }

    fn speed_mapping(&self) -> &SpeedMapping {
        &self.mapping
    }

    fn reported_step(&self) -> Step {
        self.reported_step
    }

    fn reported_direction(&self) -> Direction {
        self.reported_direction
    }

    fn last_commanded_step(&self) -> Step {
        self.sent.last().map(|c| c.0).unwrap_or(0)
    }

    fn last_commanded_direction(&self) -> Direction {
        self.sent.last().map(|c| c.1).unwrap_or_default()
    }

    fn drive(&mut self, step: Step, direction: Direction) {
        self.sent.push((step, direction));
    }

    fn subscribe(&mut self, listener: ListenerId) {
        if !self.listeners.contains(&listener) {
            self.listeners.push(listener);
        }
    }

    fn unsubscribe(&mut self, listener: ListenerId) {
        self.listeners.retain(|l| *l != listener);
    }
}
