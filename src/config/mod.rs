//! Configuration types.
//!
//! This module provides configuration options for:
//! - [`RetryConfig`]: Retry behavior for transient failures
//! - [`RateLimitPolicy`]: Client-side admission control
//! - [`ClientSettings`]: Declarative settings from serde sources or the environment

mod rate_limit;
mod retry;
mod settings;

pub use rate_limit::RateLimitPolicy;
pub use retry::RetryConfig;
pub use settings::{ClientSettings, ENV_PREFIX};
