//! Tracing subscriber setup for the command-line tools.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise crate events log at `info` (or `debug` with `verbose`).
/// Calling this more than once is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { "coursevec=debug" } else { "coursevec=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
