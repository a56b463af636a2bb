use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted for the log filter.
pub const LOG_ENV: &str = "AIEDITOR_LOG";

/// Install a `fmt` subscriber for the host application.
///
/// `default_filter` applies when `AIEDITOR_LOG` is unset or invalid. Calling
/// this more than once is harmless; only the first subscriber is kept.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
