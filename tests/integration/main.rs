//! Integration tests for azure-devops-core.
//!
//! Every test runs against a local `wiremock` server, so no Azure DevOps
//! organization or network access is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration
//!
//! # With request-level logging
//! RUST_LOG=azure_devops_core=debug cargo test --test integration -- --nocapture
//! ```

mod auth_tests;
mod common;
mod executor_tests;
mod pagination_tests;
