//! User-Agent header sent with every API call.

use std::sync::OnceLock;

const CRATE_NAME: &str = "azure-devops-core";

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

static USER_AGENT: OnceLock<String> = OnceLock::new();

/// Returns the crate's User-Agent string.
///
/// Format: `azure-devops-core/0.1.0 (rust/1.92; linux/x86_64)`
pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        format!(
            "{}/{} (rust/{}; {}/{})",
            CRATE_NAME,
            CRATE_VERSION,
            env!("CARGO_PKG_RUST_VERSION"),
            platform(),
            std::env::consts::ARCH,
        )
    })
}

/// Prefixes the crate's User-Agent with an application product token.
///
/// Returns the plain crate User-Agent when `application` is blank.
pub fn user_agent_for(application: &str) -> String {
    let application = application.trim();
    if application.is_empty() {
        user_agent().to_string()
    } else {
        format!("{} {}", application, user_agent())
    }
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}
