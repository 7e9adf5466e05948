//! Manual-clock timer queue
//!
//! Pending timers live in a fixed-capacity list. Firing order is by
//! deadline, then by submission order (token values are handed out
//! monotonically).

use heapless::Vec;

use crate::traits::{Scheduler, TimerError, TimerKind, TimerToken};

/// Maximum number of timers pending at once
///
/// A train controller holds at most two (ramp tick and delayed apply).
pub const MAX_PENDING_TIMERS: usize = 8;

/// A timer waiting for its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct PendingTimer {
    token: TimerToken,
    deadline_ms: u64,
    kind: TimerKind,
}

/// A timer whose deadline passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FiredTimer {
    /// Token returned when the timer was scheduled
    pub token: TimerToken,
    /// What the timer is for
    pub kind: TimerKind,
    /// When it was due
    pub deadline_ms: u64,
}

/// Single-threaded timer queue with a manually advanced clock
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    /// Current time in milliseconds
    now_ms: u64,
    /// Next token value
    next_token: u32,
    /// Timers not yet fired
    pending: Vec<PendingTimer, MAX_PENDING_TIMERS>,
}

impl TimerQueue {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue starting at `now_ms`
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    /// Number of timers waiting to fire
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check whether a timer of `kind` is pending
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.iter().any(|t| t.kind == kind)
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.iter().map(|t| t.deadline_ms).min()
    }

    /// Move the clock forward without firing anything
    ///
    /// The clock never moves backwards.
    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Remove and return the earliest timer due at or before `until_ms`
    ///
    /// The clock is moved to the deadline of the returned timer, so a
    /// callback that schedules a follow-up timer measures its delay from
    /// the moment it fired, not from `until_ms`.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<FiredTimer> {
        let (pos, _) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline_ms <= until_ms)
            .min_by_key(|(_, t)| (t.deadline_ms, t.token))?;

        let timer = self.pending.swap_remove(pos);
        self.advance_to(timer.deadline_ms);

        Some(FiredTimer {
            token: timer.token,
            kind: timer.kind,
            deadline_ms: timer.deadline_ms,
        })
    }
}

impl Scheduler for TimerQueue {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn schedule_after(&mut self, delay_ms: u32, kind: TimerKind) -> Result<TimerToken, TimerError> {
        let token = TimerToken(self.next_token);
        let timer = PendingTimer {
            token,
            deadline_ms: self.now_ms + delay_ms as u64,
            kind,
        };

        self.pending.push(timer).map_err(|_| TimerError::QueueFull)?;
        self.next_token = self.next_token.wrapping_add(1);
        Ok(token)
    }

    fn cancel(&mut self, token: TimerToken) {
        self.pending.retain(|t| t.token != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let late = queue.schedule_after(500, TimerKind::AccelerationTick).unwrap();
        let early = queue
            .schedule_after(100, TimerKind::DelayedApply { member: 1 })
            .unwrap();

        let first = queue.pop_due(1000).unwrap();
        assert_eq!(first.token, early);
        assert_eq!(queue.now_ms(), 100);

        let second = queue.pop_due(1000).unwrap();
        assert_eq!(second.token, late);
        assert_eq!(queue.now_ms(), 500);

        assert!(queue.pop_due(1000).is_none());
    }

    #[test]
    fn test_same_deadline_keeps_submission_order() {
        let mut queue = TimerQueue::new();
        let a = queue
            .schedule_after(200, TimerKind::DelayedApply { member: 0 })
            .unwrap();
        let b = queue.schedule_after(200, TimerKind::AccelerationTick).unwrap();

        assert_eq!(queue.pop_due(200).unwrap().token, a);
        assert_eq!(queue.pop_due(200).unwrap().token, b);
    }

    #[test]
    fn test_not_due_yet() {
        let mut queue = TimerQueue::new();
        queue.schedule_after(300, TimerKind::AccelerationTick).unwrap();

        assert!(queue.pop_due(299).is_none());
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.next_deadline(), Some(300));
    }

    #[test]
    fn test_cancel() {
        let mut queue = TimerQueue::new();
        let token = queue.schedule_after(10, TimerKind::AccelerationTick).unwrap();
        queue.cancel(token);

        assert_eq!(queue.pending_count(), 0);
        assert!(queue.pop_due(1000).is_none());

        // Unknown token is ignored
        queue.cancel(TimerToken(42));
    }

    #[test]
    fn test_delay_measured_from_current_time() {
        let mut queue = TimerQueue::starting_at(1_000);
        queue.schedule_after(250, TimerKind::AccelerationTick).unwrap();
        assert_eq!(queue.next_deadline(), Some(1_250));

        queue.advance_to(500);
        assert_eq!(queue.now_ms(), 1_000);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = TimerQueue::new();
        for _ in 0..MAX_PENDING_TIMERS {
            queue.schedule_after(1, TimerKind::AccelerationTick).unwrap();
        }

        assert_eq!(
            queue.schedule_after(1, TimerKind::AccelerationTick),
            Err(TimerError::QueueFull)
        );
    }
}
