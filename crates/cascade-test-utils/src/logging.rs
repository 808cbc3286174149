//! Logging setup for tests.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing through the test harness.
///
/// The filter defaults to `warn` and can be overridden with `RUST_LOG`.
/// Calling it more than once is harmless.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
