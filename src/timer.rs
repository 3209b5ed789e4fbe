// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Timer categories. At most one timer per category is alive at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Exit delay completion: finalizes arming.
    ExitDelay,
    /// 1 Hz exit countdown.
    ExitCountdown,
    /// Entry delay completion: escalates.
    EntryDelay,
    /// 1 Hz entry countdown.
    EntryCountdown,
    /// Pre-alarm to full alarm promotion.
    PreAlarm,
    /// Full-alarm output duration.
    AlarmDuration,
    /// Silent indicator hold.
    SilentHold,
    /// Chirp on/off toggle.
    ChirpToggle,
    /// End of a chirp sequence.
    ChirpStop,
}

impl TimerKind {
    pub const EXIT: [TimerKind; 2] = [Self::ExitDelay, Self::ExitCountdown];
    pub const ENTRY: [TimerKind; 2] = [Self::EntryDelay, Self::EntryCountdown];
    pub const CHIRP: [TimerKind; 2] = [Self::ChirpToggle, Self::ChirpStop];
    /// Everything an arm request restarts. The silent indicator hold runs
    /// on its own.
    pub const SEQUENCE: [TimerKind; 8] = [
        Self::ExitDelay,
        Self::ExitCountdown,
        Self::EntryDelay,
        Self::EntryCountdown,
        Self::PreAlarm,
        Self::AlarmDuration,
        Self::ChirpToggle,
        Self::ChirpStop,
    ];
    pub const ALL: [TimerKind; 9] = [
        Self::ExitDelay,
        Self::ExitCountdown,
        Self::EntryDelay,
        Self::EntryCountdown,
        Self::PreAlarm,
        Self::AlarmDuration,
        Self::SilentHold,
        Self::ChirpToggle,
        Self::ChirpStop,
    ];
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    seq: u64,
}

/// Deadline table keyed by [`TimerKind`].
///
/// Scheduling a category replaces any timer already alive in it. Firing is
/// driven by the owner: [`pop_due`](Self::pop_due) hands back expired timers
/// in deadline order (ties broken by scheduling order).
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: HashMap<TimerKind, Timer>,
    next_seq: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire `after` from `now`. Returns true if a live
    /// timer of the same category was replaced.
    ///
    /// A delay past the clock's range never fires: the category is left
    /// empty instead.
    pub fn schedule(&mut self, kind: TimerKind, now: Instant, after: Duration) -> bool {
        let Some(deadline) = now.checked_add(after) else {
            warn!("Timer {kind:?} delay {after:?} is out of range, not scheduled");
            return self.timers.remove(&kind).is_some();
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(kind, Timer { deadline, seq }).is_some()
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.timers.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self, kinds: &[TimerKind]) {
        for kind in kinds {
            self.timers.remove(kind);
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.timers.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.timers.get(&kind).map(|t| t.deadline)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerKind, Instant)> {
        let (kind, timer) = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(k, t)| (*k, *t))?;
        self.timers.remove(&kind);
        Some((kind, timer.deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_replaces_same_category() {
        let mut timers = TimerTable::new();
        let t0 = Instant::now();
        assert!(!timers.schedule(TimerKind::ExitDelay, t0, Duration::from_secs(10)));
        assert!(timers.schedule(TimerKind::ExitDelay, t0, Duration::from_secs(5)));
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(TimerKind::ExitDelay), Some(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_pop_due_orders_by_deadline_then_seq() {
        let mut timers = TimerTable::new();
        let t0 = Instant::now();
        timers.schedule(TimerKind::ExitDelay, t0, Duration::from_secs(2));
        timers.schedule(TimerKind::ExitCountdown, t0, Duration::from_secs(1));
        timers.schedule(TimerKind::ChirpToggle, t0, Duration::from_secs(2));

        assert!(timers.pop_due(t0).is_none());
        let now = t0 + Duration::from_secs(2);
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::ExitCountdown));
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::ExitDelay));
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::ChirpToggle));
        assert!(timers.pop_due(now).is_none());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_out_of_range_delay_is_not_scheduled() {
        let mut timers = TimerTable::new();
        let t0 = Instant::now();
        timers.schedule(TimerKind::AlarmDuration, t0, Duration::from_secs(1));
        assert!(timers.schedule(TimerKind::AlarmDuration, t0, Duration::MAX));
        assert!(!timers.is_active(TimerKind::AlarmDuration));
        assert!(!timers.schedule(TimerKind::ExitDelay, t0, Duration::from_secs(u64::MAX)));
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_cancel_all() {
        let mut timers = TimerTable::new();
        let t0 = Instant::now();
        for kind in TimerKind::ALL {
            timers.schedule(kind, t0, Duration::from_secs(1));
        }
        timers.cancel_all(&TimerKind::EXIT);
        assert!(!timers.is_active(TimerKind::ExitDelay));
        assert!(timers.is_active(TimerKind::EntryDelay));
        timers.cancel_all(&TimerKind::ALL);
        assert_eq!(timers.next_deadline(), None);
    }
}
