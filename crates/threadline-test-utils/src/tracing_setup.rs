//! Tracing initialisation for tests.

use tracing_subscriber::EnvFilter;

/// Install a subscriber that writes through the test harness and honours
/// `RUST_LOG` (default `debug` for threadline crates, `warn` elsewhere).
///
/// Only the first call per process installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,threadline_core=debug")),
        )
        .with_test_writer()
        .try_init();
}
