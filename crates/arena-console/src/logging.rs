//! Tracing subscriber setup for the console binary.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins when set; otherwise `level` is used. Logs go to stderr
/// so they never interleave with console output on stdout. Subsequent
/// calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
