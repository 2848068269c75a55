//! Prelude module for convenient imports.
//!
//! ```rust
//! use azure_devops_core::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client and its builder
//! - Error types
//! - Credential and policy configuration
//! - Request, response and pagination types

pub use crate::{
    auth::{CredentialConfig, CredentialKind, CredentialProvider, CredentialsProvider},
    cancel::{CancelHandle, CancelSignal},
    client::{Client, ClientBuilder},
    config::{ClientSettings, RateLimitPolicy, RetryConfig},
    error::{Error, ErrorKind, Result},
    pagination::{PageResult, PageTraverser, PaginationCursor},
    ratelimit::RateLimiter,
    transport::{ApiRequest, ApiResponse, Method, RequestExecutor},
};
