//! Progress throttling.
//!
//! Rate-limits per-chunk progress so a fast transfer does not flood the
//! coordinator's queue.

use std::time::{Duration, Instant};

/// Rate-limiter for one transfer's progress events.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum spacing.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Whether an event at `now` may be emitted. Records it if so.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}
