//! Tracing subscriber setup for the binary and for embedding applications.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the process entry point.

use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` takes precedence. Otherwise the level is `info`, or `debug`
/// when `debug` is set. Calling this twice is harmless: the second install
/// fails silently.
pub fn init(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init();
}
