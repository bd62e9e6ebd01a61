//! Process-wide tracing setup shared by every quoteflow binary and test.

/// Initialize tracing with `RUST_LOG` (default `info`) and JSON output.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing from configuration. `RUST_LOG`, when set, still wins.
pub fn init_with(config: &logging::LoggingConfig) {
    tracing::init_with(config);
}

/// Subscriber installation.
pub mod tracing;

/// Logging configuration.
pub mod logging;
