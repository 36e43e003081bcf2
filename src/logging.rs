//! Diagnostic logging setup.
//!
//! Log lines go to stderr through `tracing-subscriber`; stdout carries only
//! command output. Verbosity follows `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
