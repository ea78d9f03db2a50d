//! Periodic re-send of the composed message.

use std::time::{Duration, Instant};

/// Smallest interval accepted; zero would spin the event loop
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatState {
    Idle,
    Armed { interval: Duration, next_due: Instant },
}

#[derive(Debug)]
pub struct RepeatScheduler {
    state: RepeatState,
}

impl Default for RepeatScheduler {
    fn default() -> Self {
        Self {
            state: RepeatState::Idle,
        }
    }
}

impl RepeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RepeatState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, RepeatState::Armed { .. })
    }

    pub fn interval(&self) -> Option<Duration> {
        match self.state {
            RepeatState::Armed { interval, .. } => Some(interval),
            RepeatState::Idle => None,
        }
    }

    /// When the next send is due, if armed
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            RepeatState::Armed { next_due, .. } => Some(next_due),
            RepeatState::Idle => None,
        }
    }

    pub fn arm(&mut self, interval: Duration, now: Instant) {
        let interval = interval.max(MIN_REPEAT_INTERVAL);
        self.state = RepeatState::Armed {
            interval,
            next_due: now + interval,
        };
    }

    pub fn disarm(&mut self) {
        self.state = RepeatState::Idle;
    }

    /// Returns true if a send is due at `now` and schedules the next one.
    ///
    /// Missed periods are not replayed; the next deadline is measured from
    /// `now` once a deadline has passed by more than a whole interval.
    pub fn poll(&mut self, now: Instant) -> bool {
        let RepeatState::Armed { interval, next_due } = &mut self.state else {
            return false;
        };
        if now < *next_due {
            return false;
        }
        *next_due += *interval;
        if *next_due <= now {
            *next_due = now + *interval;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_fires(scheduler: &mut RepeatScheduler, start: Instant, span: Duration) -> u32 {
        let step = Duration::from_millis(1);
        let mut fires = 0;
        let mut t = start;
        while t <= start + span {
            if scheduler.poll(t) {
                fires += 1;
            }
            t += step;
        }
        fires
    }

    #[test]
    fn test_idle_never_fires() {
        let mut scheduler = RepeatScheduler::new();
        let now = Instant::now();
        assert!(!scheduler.poll(now + Duration::from_secs(10)));
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_fires_k_times_over_k_intervals() {
        let mut scheduler = RepeatScheduler::new();
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        scheduler.arm(interval, start);

        let fires = count_fires(&mut scheduler, start, interval * 7);
        assert!((6..=8).contains(&fires), "fired {} times", fires);
    }

    #[test]
    fn test_disarm_stops_immediately() {
        let mut scheduler = RepeatScheduler::new();
        let start = Instant::now();
        scheduler.arm(Duration::from_millis(10), start);
        assert!(scheduler.poll(start + Duration::from_millis(10)));

        scheduler.disarm();
        assert!(!scheduler.is_armed());
        assert_eq!(
            count_fires(&mut scheduler, start, Duration::from_millis(500)),
            0
        );
    }

    #[test]
    fn test_late_poll_does_not_burst() {
        let mut scheduler = RepeatScheduler::new();
        let start = Instant::now();
        scheduler.arm(Duration::from_millis(10), start);

        let late = start + Duration::from_millis(1000);
        assert!(scheduler.poll(late));
        assert!(!scheduler.poll(late));
        assert_eq!(scheduler.next_deadline(), Some(late + Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let mut scheduler = RepeatScheduler::new();
        scheduler.arm(Duration::ZERO, Instant::now());
        assert_eq!(scheduler.interval(), Some(MIN_REPEAT_INTERVAL));
    }
}
