//! Client-side admission control.
//!
//! - [`TokenBucket`]: Continuous-refill bucket bounding the request rate
//! - [`RateLimiter`]: Shared limiter with per-endpoint contention backoff and
//!   server throttling absorption
//! - [`RateLimiterStats`]: Read-only snapshot for diagnostics

mod bucket;
mod limiter;

pub use bucket::TokenBucket;
pub use limiter::{RateLimiter, RateLimiterStats};
