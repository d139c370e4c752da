//! Structured logging setup
//!
//! Console or file output with json or pretty formatting, selected through
//! [`LoggingConfig`]. File output goes through a non-blocking writer; the
//! returned guard must be held for as long as logging should keep flowing,
//! and dropping it flushes the background worker.

use crate::config::{get_config, LoggingConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging from the global configuration. Returns the file
/// writer guard when file output is configured, `None` for console output.
pub fn init_logging() -> Option<WorkerGuard> {
    let config = get_config();
    init_with(&config.logging, &config.paths.log_directory)
}

fn init_with(logging: &LoggingConfig, log_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let json = logging.format == "json";
    let registry = tracing_subscriber::registry().with(filter);

    // try_init: an already-installed subscriber is kept, not replaced.
    match logging.output.as_str() {
        "file" => {
            let appender = tracing_appender::rolling::daily(log_dir, "token-audit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = if json {
                registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .try_init()
            } else {
                registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()
            };
            Some(guard)
        }
        _ => {
            let _ = if json {
                registry.with(fmt::layer().json().with_target(true)).try_init()
            } else {
                registry.with(fmt::layer().pretty().with_target(true)).try_init()
            };
            None
        }
    }
}
