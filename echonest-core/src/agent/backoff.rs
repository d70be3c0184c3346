//! Reconnect backoff policy
//!
//! Plain exponential backoff: the delay doubles after every failed
//! attempt up to a cap and snaps back to the base after a successful
//! connect. No jitter, no attempt limit.

use std::time::Duration;

/// Delay before the first retry, and after any successful connect
pub const BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound for the retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base,
            base,
            max,
        }
    }

    /// Delay the next failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Back to the base delay
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Take the delay for this failure and double it for the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_BACKOFF, MAX_BACKOFF)
    }
}
