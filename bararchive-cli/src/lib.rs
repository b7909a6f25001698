//! Shared plumbing for the bararchive binaries.

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

/// Default location of the connection config.
pub const DEFAULT_CONFIG_PATH: &str = "config/db_config.json";

/// Default root for archived data.
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Build the log subscriber for one invocation.
///
/// `info` by default, `debug` with `--debug`; `RUST_LOG` wins when set.
/// Callers install it with `tracing::subscriber::with_default` so the
/// logger is scoped to the run instead of being process-global.
pub fn log_subscriber(debug: bool) -> impl Subscriber + Send + Sync + 'static {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish()
}
