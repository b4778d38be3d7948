//! Tracing setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Build the filter: RUST_LOG when set, otherwise the configured directive.
/// An unparsable directive falls back to `info`.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable. Calling this twice is harmless.
pub fn init_tracing(configured: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
