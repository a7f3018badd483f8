//! Logging setup
//!
//! `RUST_LOG` wins over the configured level when set.

use std::path::Path;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::EnvFilter;

/// Log file prefix inside the log directory
const LOG_FILE_PREFIX: &str = "civic-client";

/// Initialize the logger at `info`
pub fn init_logger() {
    init_logger_with_file(None, false, None);
}

/// Initialize the logger with an optional level, JSON output and log directory.
///
/// Falls back to stderr when `log_dir` does not exist.
pub fn init_logger_with_file(log_level: Option<&str>, json: bool, log_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let appender = log_dir.and_then(file_appender);

    // try_init: a second call (tests, embedding apps) keeps the first subscriber
    let result = match (json, appender) {
        (true, Some(appender)) => builder.json().with_writer(appender).try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(appender)) => builder.with_ansi(false).with_writer(appender).try_init(),
        (false, None) => builder.try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("Logger already initialized: {}", e);
    }
}

/// Daily rolling appender in `dir`, if the directory exists
fn file_appender(dir: &str) -> Option<RollingFileAppender> {
    let path = Path::new(dir);
    if !path.is_dir() {
        return None;
    }
    Some(tracing_appender::rolling::daily(path, LOG_FILE_PREFIX))
}
