//! Structured logging setup.
//!
//! Logs go to stderr so `--output json` on stdout stays machine-readable.
//! `RUST_LOG` overrides the default level.

use tracing_subscriber::EnvFilter;

pub(crate) fn init(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
