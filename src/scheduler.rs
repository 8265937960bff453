//! Deferred steps on a game-time axis, and the pausable clock that drives them.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone)]
struct Scheduled<T> {
    id: TaskId,
    at: Duration,
    task: T,
}

/// Timed, cancellable callbacks. Time is whatever the caller passes in, so tests
/// step it by hand.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    tasks: Vec<Scheduled<T>>,
    next_id: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
        }
    }

    /// Run `task` once game time reaches `at`.
    pub fn schedule(&mut self, at: Duration, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(Scheduled { id, at, task });
        id
    }

    /// Returns false if the task already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Earliest task due at or before `now`; ties go to the one scheduled first.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.at <= now)
            .min_by_key(|(_, t)| (t.at, t.id.0))
            .map(|(i, _)| i)?;
        let Scheduled { at, task, .. } = self.tasks.remove(index);
        Some((at, task))
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.tasks.iter().map(|t| t.at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Elapsed game time. Stops while paused so pending steps wait with it.
#[derive(Debug, Clone)]
pub struct GameClock {
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl GameClock {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let frozen = self.paused_at.unwrap_or(now);
        frozen
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(at);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_pop_due_in_time_order() {
        let mut s = Scheduler::new();
        s.schedule(ms(300), "late");
        s.schedule(ms(100), "early");
        assert_eq!(s.pop_due(ms(50)), None);
        assert_eq!(s.pop_due(ms(400)), Some((ms(100), "early")));
        assert_eq!(s.pop_due(ms(400)), Some((ms(300), "late")));
        assert!(s.is_empty());
    }

    #[test]
    fn test_equal_due_times_are_fifo() {
        let mut s = Scheduler::new();
        s.schedule(ms(10), 1);
        s.schedule(ms(10), 2);
        s.schedule(ms(10), 3);
        let order: Vec<i32> = std::iter::from_fn(|| s.pop_due(ms(10)).map(|(_, t)| t)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        let a = s.schedule(ms(10), 'a');
        s.schedule(ms(20), 'b');
        assert!(s.cancel(a));
        assert!(!s.cancel(a));
        assert_eq!(s.next_due(), Some(ms(20)));
        assert_eq!(s.pop_due(ms(20)), Some((ms(20), 'b')));
        assert_eq!(s.next_due(), None);
    }

    #[test]
    fn test_clock_stops_while_paused() {
        let t0 = Instant::now();
        let mut clock = GameClock::new(t0);
        assert_eq!(clock.elapsed(t0 + ms(100)), ms(100));
        clock.pause(t0 + ms(100));
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed(t0 + ms(900)), ms(100));
        clock.resume(t0 + ms(1000));
        assert_eq!(clock.elapsed(t0 + ms(1050)), ms(150));
    }
}
