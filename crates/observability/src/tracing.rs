//! Subscriber installation.
//!
//! Services log JSON lines; tests log compact text through the test writer so
//! `cargo test` captures it per test.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set and valid, `default_directive` otherwise.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// JSON subscriber for a service process. Later calls are no-ops.
pub fn init(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_current_span(false)
        .try_init();
}

/// Compact subscriber writing through the test harness. Later calls are no-ops.
pub fn init_for_tests(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .compact()
        .with_test_writer()
        .try_init();
}
