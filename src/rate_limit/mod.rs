// Delta rate limiting for noisy numeric entities.
//
// A policy lets a value through once `min_interval` has elapsed since the last
// publish, or sooner when it moved at least `delta_threshold` away from the
// last published value.

use std::time::{Duration, Instant};

/// Rate limit attached to a single entity key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    pub min_interval: Duration,
    pub delta_threshold: f64,
}

impl RateLimitPolicy {
    pub fn new(min_interval: Duration, delta_threshold: f64) -> Self {
        Self {
            min_interval,
            delta_threshold,
        }
    }

    /// Decide whether a change may be published now.
    ///
    /// `delta` is `None` for non-numeric values, in which case only the
    /// interval applies.
    pub fn allows(&self, last_published_at: Instant, now: Instant, delta: Option<f64>) -> bool {
        let elapsed = now.saturating_duration_since(last_published_at);
        if elapsed >= self.min_interval {
            return true;
        }
        matches!(delta, Some(d) if d.abs() >= self.delta_threshold)
    }
}
