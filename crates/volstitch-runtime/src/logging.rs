//! Logging setup for binaries and tests built on the runtime.
//!
//! Everything in the workspace logs through the `log` facade; this only installs a
//! backend.

use env_logger::Env;

/// Installs `env_logger` with an `info` default, overridable through `RUST_LOG`.
/// Later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

/// Same as [`init_logger`] but captured by the test harness.
pub fn init_test_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
