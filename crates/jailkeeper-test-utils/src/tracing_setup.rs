//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`
/// (default `jailkeeper_core=debug`). Repeated calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jailkeeper_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init();
}
