//! Client-side admission tuning.
//!
//! ## Example
//!
//! ```rust
//! use azure_devops_core::RateLimitPolicy;
//! use std::time::Duration;
//!
//! let policy = RateLimitPolicy::builder()
//!     .rate_per_second(5.0)      // steady-state admission rate
//!     .burst_capacity(20)        // bucket size
//!     .base_retry_delay(Duration::from_millis(500))
//!     .build();
//! assert!(policy.validate().is_ok());
//! ```

use std::time::Duration;

use crate::Error;

/// Token bucket and contention-backoff settings for a [`RateLimiter`](crate::RateLimiter).
///
/// Defaults follow the service's published per-user budget: 10 requests per second
/// with a burst of 50.
#[derive(Debug, Clone, PartialEq, bon::Builder)]
pub struct RateLimitPolicy {
    /// Tokens added to the bucket per second.
    #[builder(default = 10.0)]
    rate_per_second: f64,

    /// Maximum tokens the bucket holds; the bucket starts full.
    #[builder(default = 50)]
    burst_capacity: u32,

    /// Penalty recorded the first time an endpoint meets an empty bucket.
    #[builder(default = Duration::from_secs(1))]
    base_retry_delay: Duration,

    /// Number of admission attempts before giving up with `RateLimited`.
    #[builder(default = 3)]
    max_attempts: u32,

    /// Factor applied to an endpoint's penalty on each further contention.
    #[builder(default = 2.0)]
    backoff_multiplier: f64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RateLimitPolicy {
    /// Returns the refill rate in tokens per second.
    pub fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    /// Returns the bucket capacity.
    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    /// Returns the base contention penalty.
    pub fn base_retry_delay(&self) -> Duration {
        self.base_retry_delay
    }

    /// Returns the number of admission attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the penalty multiplier.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Checks that the policy can admit work at all.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.rate_per_second.is_finite() || self.rate_per_second <= 0.0 {
            return Err(Error::configuration(format!(
                "rate_per_second must be positive, got {}",
                self.rate_per_second
            )));
        }
        if self.burst_capacity == 0 {
            return Err(Error::configuration("burst_capacity must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(Error::configuration("max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::configuration(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}
