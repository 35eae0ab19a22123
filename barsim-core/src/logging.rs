//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output always; an optional daily-rotating log file next to it.
//! The level comes from `RUST_LOG` when set, otherwise from the argument.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber. Call once at program start.
///
/// - `log_level`: default filter when `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_dir`: directory for daily-rotating log files, if any
/// - `file_prefix`: log file prefix (e.g. `"barsim"`)
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, file_prefix: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
            .is_ok()
    }
}
