//! Diagnostic tracing for `cdx`.
//!
//! Logs go to stderr so stdout carries only the JSON run result. The trace
//! journal (`io/trace`) is product output and unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter: session progress from this crate, warnings from everything else.
pub const DEFAULT_FILTER: &str = "cdx=info,warn";

/// Initialize the stderr subscriber.
///
/// Reads `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// # Example
/// ```bash
/// RUST_LOG=cdx=debug cdx run "fix the failing test"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
