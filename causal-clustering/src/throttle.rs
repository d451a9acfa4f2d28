//! Rate limiting for repetitive log lines.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Lets an action through at most once per `interval`.
///
/// Used for messages that would otherwise repeat on every retry or every
/// send, such as "waiting for peers" or "unknown address".
pub struct LogThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` if the caller should log now, and starts a new interval.
    pub fn should_log(&self) -> bool {
        self.should_log_at(Instant::now())
    }

    fn should_log_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Runs `log` unless it already ran within the current interval.
    pub fn invoke(&self, log: impl FnOnce()) {
        if self.should_log() {
            log();
        }
    }
}
