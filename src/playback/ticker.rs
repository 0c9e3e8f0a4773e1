//! Position update timer.
//!
//! Runs only while audio is playing; the controller starts it on entering
//! `Playing` and stops it on every other transition.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PositionTicker {
    interval: Duration,
    next_due: Option<Instant>,
}

impl PositionTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Whether a tick fires at `now`; schedules the next one if so.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(at) if now >= at => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_ticker_never_fires() {
        let mut ticker = PositionTicker::new(Duration::from_millis(100));
        assert!(!ticker.due(Instant::now()));
    }

    #[test]
    fn fires_once_per_interval() {
        let start = Instant::now();
        let mut ticker = PositionTicker::new(Duration::from_millis(100));
        ticker.start(start);
        assert!(ticker.due(start));
        assert!(!ticker.due(start + Duration::from_millis(50)));
        assert!(ticker.due(start + Duration::from_millis(100)));
    }

    #[test]
    fn stop_silences_ticker() {
        let start = Instant::now();
        let mut ticker = PositionTicker::new(Duration::from_millis(100));
        ticker.start(start);
        ticker.stop();
        assert!(!ticker.is_active());
        assert!(!ticker.due(start + Duration::from_secs(1)));
    }
}
