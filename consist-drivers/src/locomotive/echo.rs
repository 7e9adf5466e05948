//! Command echo matching
//!
//! A command station reports every state change, including the ones
//! caused by our own commands. Replies arrive in command order but some
//! commands never produce one (dropped by the channel, or coalesced by
//! the station), so a reply may skip over older pending commands.

use heapless::Deque;

use consist_core::traits::{Direction, Step, EMERGENCY_STOP};

/// Commands remembered while waiting for their reply
pub const MAX_PENDING_COMMANDS: usize = 8;

/// A command waiting for its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SentCommand {
    pub step: Step,
    pub direction: Direction,
}

impl SentCommand {
    /// Check if a reported state is the reply to this command
    ///
    /// Stations report an emergency stop as plain step 0.
    pub fn matches(&self, step: Step, direction: Direction) -> bool {
        if self.direction != direction {
            return false;
        }
        self.step == step || (self.step == EMERGENCY_STOP && step == 0)
    }
}

/// Matches replies against sent commands
#[derive(Debug, Clone, Default)]
pub struct EchoMatcher {
    pending: Deque<SentCommand, MAX_PENDING_COMMANDS>,
}

impl EchoMatcher {
    /// Create an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a sent command
    ///
    /// When full, the oldest command is forgotten.
    pub fn record(&mut self, command: SentCommand) {
        if self.pending.is_full() {
            let _ = self.pending.pop_front();
        }
        let _ = self.pending.push_back(command);
    }

    /// Check a reported state against the pending commands
    ///
    /// On a match the command and every older one are retired and `true`
    /// is returned. Anything else is a change made elsewhere.
    pub fn match_reply(&mut self, step: Step, direction: Direction) -> bool {
        let Some(pos) = self.pending.iter().position(|c| c.matches(step, direction)) else {
            return false;
        };

        for _ in 0..=pos {
            let _ = self.pending.pop_front();
        }
        true
    }

    /// Number of commands waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget all pending commands
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
