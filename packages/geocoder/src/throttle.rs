//! Minimum-interval throttle for outgoing geocoding requests.
//!
//! Unlike a queueing limiter, a throttled request is not delayed: the
//! caller is told to skip it. Hovering keeps moving, and a lookup for a
//! cell the cursor has already left is not worth waiting for.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Allows at most one request per `min_interval`.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Records a request and returns `true` if the interval has elapsed
    /// since the last recorded one; returns `false` without recording
    /// otherwise.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.duration_since(previous) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
