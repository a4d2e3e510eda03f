//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber.
///
/// `BACKLOGD_LOG` selects levels (`RUST_LOG` syntax); `default_level` applies
/// when it is unset. Safe to call more than once, as tests do.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env("BACKLOGD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
