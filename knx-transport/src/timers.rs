//! Inactivity and acknowledgement timers

use std::time::{Duration, Instant};

/// One-shot timer driven by explicit timestamps
///
/// The transport layer never reads the clock itself; callers pass `now`
/// into every operation, which keeps the timers deterministic in tests.
#[derive(Debug, Clone)]
pub struct Timer {
    started: Option<Instant>,
    timeout: Duration,
}

impl Timer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            started: None,
            timeout,
        }
    }

    /// (Re)start the timer at `now`
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Whether the timer is running and `timeout` has elapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.started {
            Some(started) => now.saturating_duration_since(started) >= self.timeout,
            None => false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Bounded retransmission counter
#[derive(Debug, Clone)]
pub struct RepeatCounter {
    count: u8,
    max: u8,
}

impl RepeatCounter {
    pub fn new(max: u8) -> Self {
        Self { count: 0, max }
    }

    /// Whether another repetition is allowed
    pub fn can_repeat(&self) -> bool {
        self.count < self.max
    }

    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}
