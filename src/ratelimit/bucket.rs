//! Continuous-refill token bucket.

use std::time::Duration;

use tokio::time::Instant;

/// Tolerance absorbing float drift when a waiter wakes exactly at refill time.
const EPSILON: f64 = 1e-9;

/// A token bucket refilled continuously at `rate` tokens per second.
///
/// Tokens stay within `[0, capacity]` at all times. The bucket starts full.
/// `last_refill` may lie in the future after a server-imposed pause, in which
/// case no tokens accrue until that instant.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(rate: f64, capacity: u32, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            rate,
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Returns the bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Returns the token count as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Token count at `now` without mutating the bucket.
    pub fn available_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.rate).min(self.capacity)
    }

    /// Adds the tokens accrued since the last refill.
    pub fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            self.tokens = self.available_at(now);
            self.last_refill = now;
        }
    }

    /// Consumes `n` tokens if available. Returns `false` and leaves the bucket
    /// untouched otherwise.
    pub fn try_consume(&mut self, n: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens + EPSILON >= n {
            self.tokens = (self.tokens - n).max(0.0);
            true
        } else {
            false
        }
    }

    /// Time until `n` tokens will be available, zero if they already are.
    pub fn time_until_available(&self, n: f64, now: Instant) -> Duration {
        let available = self.available_at(now);
        if available + EPSILON >= n {
            return Duration::ZERO;
        }
        let paused = self.last_refill.saturating_duration_since(now);
        let refill =
            Duration::try_from_secs_f64((n - available) / self.rate).unwrap_or(Duration::MAX);
        paused.saturating_add(refill)
    }

    /// Empties the bucket and suspends refill until `now + delay`.
    pub fn pause(&mut self, delay: Duration, now: Instant) {
        self.tokens = 0.0;
        self.last_refill = now + delay;
    }
}
