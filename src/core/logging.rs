//! Diagnostic logging.
//!
//! Library code only emits `tracing` events. Binaries, tests and benches
//! that want to see them call [`init`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a subscriber filtered by `RUST_LOG` (default `warn`), writing
/// compact lines to stderr. Calling it more than once is a no-op.
///
/// ```bash
/// RUST_LOG=bioapp=debug cargo test
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
