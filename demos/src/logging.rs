//! Tracing subscriber setup shared by the binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to `default_level`.
///
/// A second call leaves the first subscriber in place.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
