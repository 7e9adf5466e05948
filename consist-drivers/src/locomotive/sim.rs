//! Simulated locomotive
//!
//! Stands in for a decoder behind a command station. Commands go into an
//! outbox and only take effect when the test (or a desktop front end)
//! delivers them, so replies can be delayed, reordered against manual
//! throttle input, or lost.
//!
//! # Usage
//!
//! ```ignore
//! let mut loco = SimulatedLocomotive::new(mapping);
//! loco.drive(12, Direction::Forward);
//!
//! // Later, the command station answers
//! if let Some(event) = loco.deliver_next() {
//!     train.on_member_changed(event.address, event.is_echo);
//! }
//! ```

use heapless::{Deque, Vec};

use consist_core::speed::SpeedMapping;
use consist_core::traits::{
    Address, ChangeEvent, Direction, ListenerId, Locomotive, Step, EMERGENCY_STOP,
};

use super::echo::{EchoMatcher, SentCommand};

/// Commands that can be in flight at once
pub const COMMAND_QUEUE_LEN: usize = 8;

/// Maximum subscribed listeners
pub const MAX_LISTENERS: usize = 4;

/// Locomotive behind a simulated command station
#[derive(Debug, Clone)]
pub struct SimulatedLocomotive {
    mapping: SpeedMapping,
    /// State reported by the station
    reported_step: Step,
    reported_direction: Direction,
    /// Most recent command
    commanded_step: Step,
    commanded_direction: Direction,
    /// Sent but not yet processed by the station
    outbox: Deque<SentCommand, COMMAND_QUEUE_LEN>,
    echoes: EchoMatcher,
    listeners: Vec<ListenerId, MAX_LISTENERS>,
    /// Commands lost to a full outbox or `drop_next`
    dropped: u32,
}

impl SimulatedLocomotive {
    /// Create a stopped locomotive facing forward
    pub fn new(mapping: SpeedMapping) -> Self {
        Self {
            mapping,
            reported_step: 0,
            reported_direction: Direction::Forward,
            commanded_step: 0,
            commanded_direction: Direction::Forward,
            outbox: Deque::new(),
            echoes: EchoMatcher::new(),
            listeners: Vec::new(),
            dropped: 0,
        }
    }

    /// Commands not yet processed by the station
    pub fn in_flight(&self) -> usize {
        self.outbox.len()
    }

    /// Commands lost so far
    pub fn dropped_commands(&self) -> u32 {
        self.dropped
    }

    /// Subscribed listeners
    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }

    /// Let the station process the oldest command
    ///
    /// The station reports an emergency stop as step 0. Returns the change
    /// event to forward, if the state changed and anyone listens.
    pub fn deliver_next(&mut self) -> Option<ChangeEvent> {
        let command = self.outbox.pop_front()?;
        let step = if command.step == EMERGENCY_STOP {
            0
        } else {
            command.step
        };

        self.feedback(step, command.direction)
    }

    /// Apply a state report from the command station
    ///
    /// A report equal to a pending command is flagged as its echo.
    pub fn feedback(&mut self, step: Step, direction: Direction) -> Option<ChangeEvent> {
        let is_echo = self.echoes.match_reply(step, direction);
        self.report(step, direction, is_echo)
    }

    /// Lose the oldest command without a reply
    pub fn drop_next(&mut self) -> bool {
        if self.outbox.pop_front().is_some() {
            self.dropped += 1;
            true
        } else {
            false
        }
    }

    /// Simulate a handheld throttle acting on this locomotive
    ///
    /// Never counts as an echo. `EMERGENCY_STOP` is passed on unchanged.
    pub fn throttle(&mut self, step: Step, direction: Direction) -> Option<ChangeEvent> {
        self.report(step, direction, false)
    }

    fn report(&mut self, step: Step, direction: Direction, is_echo: bool) -> Option<ChangeEvent> {
        let changed = step != self.reported_step || direction != self.reported_direction;
        self.reported_step = step;
        self.reported_direction = direction;

        if !changed || self.listeners.is_empty() {
            return None;
        }

        Some(ChangeEvent {
            address: self.mapping.address(),
            is_echo,
        })
    }
}

impl Locomotive for SimulatedLocomotive {
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
        self.commanded_step
    }

    fn last_commanded_direction(&self) -> Direction {
        self.commanded_direction
    }

    fn drive(&mut self, step: Step, direction: Direction) {
        self.commanded_step = step;
        self.commanded_direction = direction;

        let command = SentCommand { step, direction };
        self.echoes.record(command);

        if self.outbox.is_full() {
            let _ = self.outbox.pop_front();
            self.dropped += 1;
        }
        let _ = self.outbox.push_back(command);
    }

    fn subscribe(&mut self, listener: ListenerId) {
        if !self.listeners.contains(&listener) {
            let _ = self.listeners.push(listener);
        }
    }

    fn unsubscribe(&mut self, listener: ListenerId) {
        self.listeners.retain(|l| *l != listener);
    }
}
