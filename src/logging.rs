//! Tracing subscriber setup.
//!
//! Levels used across the crate:
//! - WARN: failed exchanges, unconfirmed sends, bring-up fallbacks
//! - INFO: bring-up milestones, reachability
//! - DEBUG: each command exchange, dropped frame headers, link changes
//! - TRACE: state transitions and raw writes

use tracing_subscriber::EnvFilter;

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs a formatting subscriber filtered by `RUST_LOG`, `info` if unset.
///
/// Does nothing if a global subscriber is already installed.
pub fn init() {
    let _ = tracing_subscriber::fmt().with_env_filter(filter_or("info")).try_init();
}

/// Same as [`init`] but defaults to `debug` and writes through the test harness
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or("debug"))
        .with_test_writer()
        .try_init();
}
