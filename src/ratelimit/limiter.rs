//! Shared admission control for outbound requests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::bucket::TokenBucket;
use crate::cancel::CancelSignal;
use crate::config::RateLimitPolicy;
use crate::Error;

/// Admitted requests remembered for [`RateLimiter::stats`].
const HISTORY_CAPACITY: usize = 1000;

/// Window over which [`RateLimiterStats`] counts recent requests.
const STATS_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RequestRecord {
    at: Instant,
    method: String,
    endpoint: String,
}

#[derive(Debug)]
struct LimiterState {
    bucket: TokenBucket,
    penalties: HashMap<String, Duration>,
    history: VecDeque<RequestRecord>,
}

/// Token bucket admission with adaptive per-endpoint backoff.
///
/// One limiter is meant to be shared, via `Arc`, by every client that draws on
/// the same server budget. All state sits behind one lock so check-and-decrement
/// is atomic; the lock is released before any wait.
///
/// ## Contention backoff
///
/// When a `method:endpoint` pair meets an empty bucket for the first time its
/// penalty is set to the policy's base delay and the caller waits only for the
/// next token. On each further contention the caller waits for the larger of
/// the refill time and the penalty, and the penalty grows by the backoff
/// multiplier. A successful admission clears the pair's penalty.
///
/// ## Example
///
/// ```rust
/// use azure_devops_core::{RateLimitPolicy, RateLimiter};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), azure_devops_core::Error> {
/// let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::default())?);
/// limiter.acquire("GET", "projects").await?;
/// assert_eq!(limiter.stats().recent_requests, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the policy is invalid.
    pub fn new(policy: RateLimitPolicy) -> Result<Self, Error> {
        policy.validate()?;
        let bucket = TokenBucket::new(
            policy.rate_per_second(),
            policy.burst_capacity(),
            Instant::now(),
        );
        Ok(Self {
            policy,
            state: Mutex::new(LimiterState {
                bucket,
                penalties: HashMap::new(),
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
        })
    }

    /// Returns the policy this limiter enforces.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Waits until a token is available and consumes it.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited`, with the time until the next token as the retry
    /// hint, after `max_attempts` failed admissions.
    pub async fn acquire(&self, method: &str, endpoint: &str) -> Result<(), Error> {
        self.acquire_with_cancel(method, endpoint, &CancelSignal::never())
            .await
    }

    /// Like [`acquire`](Self::acquire), returning `Cancelled` if `cancel`
    /// fires while waiting.
    pub async fn acquire_with_cancel(
        &self,
        method: &str,
        endpoint: &str,
        cancel: &CancelSignal,
    ) -> Result<(), Error> {
        let key = format!("{}:{}", method, endpoint);
        let max_attempts = self.policy.max_attempts();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }

            let wait = match self.try_admit(&key, method, endpoint) {
                None => return Ok(()),
                Some(wait) => wait,
            };

            if attempt == max_attempts {
                break;
            }

            tracing::debug!(
                method,
                endpoint,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "rate limiter bucket empty, waiting"
            );
            cancel.sleep(wait).await?;
        }

        let retry_after = {
            let state = self.state.lock();
            state.bucket.time_until_available(1.0, Instant::now())
        };
        tracing::warn!(
            method,
            endpoint,
            attempts = max_attempts,
            retry_after_ms = retry_after.as_millis() as u64,
            "client-side rate limit exhausted"
        );
        Err(Error::new(
            crate::ErrorKind::RateLimited,
            format!(
                "rate limit exceeded after {} attempts for {} {}",
                max_attempts, method, endpoint
            ),
        )
        .with_retry_after(retry_after))
    }

    /// One locked admission attempt. `None` on success, otherwise the wait
    /// before the next attempt.
    fn try_admit(&self, key: &str, method: &str, endpoint: &str) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        if state.bucket.try_consume(1.0, now) {
            state.penalties.remove(key);
            if state.history.len() == HISTORY_CAPACITY {
                state.history.pop_front();
            }
            state.history.push_back(RequestRecord {
                at: now,
                method: method.to_string(),
                endpoint: endpoint.to_string(),
            });
            return None;
        }

        let wait = state.bucket.time_until_available(1.0, now);
        let wait = match state.penalties.get_mut(key) {
            Some(penalty) => {
                let delay = wait.max(*penalty);
                *penalty = scale(*penalty, self.policy.backoff_multiplier());
                delay
            }
            None => {
                state
                    .penalties
                    .insert(key.to_string(), self.policy.base_retry_delay());
                wait
            }
        };
        Some(wait)
    }

    /// Absorbs a server throttling signal: empties the bucket and defers
    /// refill by `retry_after`.
    pub fn handle_server_rate_limit(&self, retry_after: Duration) {
        let mut state = self.state.lock();
        state.bucket.pause(retry_after, Instant::now());
        tracing::warn!(
            retry_after_ms = retry_after.as_millis() as u64,
            "server throttled requests, pausing admission"
        );
    }

    /// Clears every endpoint's contention penalty.
    pub fn reset_penalties(&self) {
        self.state.lock().penalties.clear();
    }

    /// Snapshot of the limiter. Does not refill or otherwise mutate the bucket.
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        let now = Instant::now();

        let mut endpoint_counts = HashMap::new();
        let mut method_counts = HashMap::new();
        let mut recent_requests = 0;
        for record in state
            .history
            .iter()
            .filter(|r| now.saturating_duration_since(r.at) < STATS_WINDOW)
        {
            recent_requests += 1;
            *endpoint_counts.entry(record.endpoint.clone()).or_insert(0) += 1;
            *method_counts.entry(record.method.clone()).or_insert(0) += 1;
        }

        RateLimiterStats {
            current_tokens: state.bucket.available_at(now),
            max_tokens: self.policy.burst_capacity(),
            rate_per_second: self.policy.rate_per_second(),
            recent_requests,
            endpoint_counts,
            method_counts,
            penalties: state.penalties.clone(),
        }
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Read-only view of a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterStats {
    /// Tokens available right now.
    pub current_tokens: f64,
    /// Bucket capacity.
    pub max_tokens: u32,
    /// Configured refill rate.
    pub rate_per_second: f64,
    /// Requests admitted in the last minute.
    pub recent_requests: usize,
    /// Recent admissions per endpoint.
    pub endpoint_counts: HashMap<String, usize>,
    /// Recent admissions per HTTP method.
    pub method_counts: HashMap<String, usize>,
    /// Current contention penalty per `method:endpoint`.
    pub penalties: HashMap<String, Duration>,
}
