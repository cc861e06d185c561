//! Scheduler state management.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Lifecycle of the broadcast timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPhase {
    /// Created but not yet started.
    #[default]
    Idle,
    /// Timer running.
    Armed,
    /// Shut down; no further ticks.
    Stopped,
}

/// Observable state of the broadcast scheduler.
#[derive(Debug, Default)]
pub struct SchedulerState {
    /// Current phase.
    pub phase: SchedulerPhase,

    /// Interval the timer is armed with.
    pub interval: Option<Duration>,

    /// Broadcasts handed to the transport successfully.
    pub broadcasts_sent: u64,

    /// Broadcasts the transport failed to deliver.
    pub failed_deliveries: u64,

    /// Wall-clock time of the last successful broadcast.
    pub last_broadcast_at: Option<DateTime<Utc>>,

    /// When the next tick is due (monotonic clock).
    next_due: Option<Instant>,
}

impl SchedulerState {
    /// Creates a new scheduler state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters `Armed` with `first_due` as the next tick.
    pub fn arm(&mut self, interval: Duration, first_due: Instant) {
        self.phase = SchedulerPhase::Armed;
        self.interval = Some(interval);
        self.next_due = Some(first_due);
    }

    /// Records a tick and schedules the following one.
    pub fn record_tick(&mut self, delivered: bool, fired_at: Instant) {
        if delivered {
            self.broadcasts_sent += 1;
            self.last_broadcast_at = Some(Utc::now());
        } else {
            self.failed_deliveries += 1;
        }
        self.next_due = self.interval.map(|interval| fired_at + interval);
    }

    /// Moves the deadline on for a tick that had nothing to send.
    pub fn record_skip(&mut self, fired_at: Instant) {
        self.next_due = self.interval.map(|interval| fired_at + interval);
    }

    /// Enters `Stopped`.
    pub fn stop(&mut self) {
        self.phase = SchedulerPhase::Stopped;
        self.next_due = None;
    }

    /// Time until the next tick, if one is scheduled.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        if self.phase != SchedulerPhase::Armed {
            return None;
        }
        self.next_due
            .map(|due| due.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.phase == SchedulerPhase::Armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = SchedulerState::default();
        assert_eq!(state.phase, SchedulerPhase::Idle);
        assert_eq!(state.broadcasts_sent, 0);
        assert!(state.last_broadcast_at.is_none());
        assert!(state.time_until_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_then_tick() {
        let mut state = SchedulerState::new();
        let now = Instant::now();
        state.arm(Duration::from_secs(60), now);
        assert!(state.is_armed());
        assert_eq!(state.time_until_next(), Some(Duration::ZERO));

        state.record_tick(true, now);
        assert_eq!(state.broadcasts_sent, 1);
        assert!(state.last_broadcast_at.is_some());
        assert_eq!(state.time_until_next(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_still_schedules_next() {
        let mut state = SchedulerState::new();
        let now = Instant::now();
        state.arm(Duration::from_secs(30), now);
        state.record_tick(false, now);

        assert_eq!(state.broadcasts_sent, 0);
        assert_eq!(state.failed_deliveries, 1);
        assert_eq!(state.time_until_next(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_stop_clears_next() {
        let mut state = SchedulerState::new();
        state.arm(Duration::from_secs(30), Instant::now());
        state.stop();
        assert_eq!(state.phase, SchedulerPhase::Stopped);
        assert!(state.time_until_next().is_none());
    }
}
