use std::env;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "CCHISTORY_LOG";

/// Installs the stderr logger. `CCHISTORY_LOG` (or `RUST_LOG`) takes a full
/// filter directive; otherwise only warnings are shown, or debug output with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = env::var(LOG_ENV)
        .or_else(|_| env::var(EnvFilter::DEFAULT_ENV))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
