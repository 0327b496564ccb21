//! Shared helpers between unit tests.

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

// This will ensure the test logger is only initialized once.
static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}
