//! Tracing subscriber setup.
//!
//! Logs always go to stderr. When a directory is configured they are also
//! written to a daily-rotated file there, without ANSI colors.
//!
//! `RUST_LOG` overrides the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Prefix of rotated log file names.
pub const LOG_FILE_PREFIX: &str = "tripsession.log";

/// Log output settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `tripsession=debug`.
    pub level: String,
    /// Directory for rotated log files.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Keeps the background log writer alive. Drop it on shutdown to flush.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter from `RUST_LOG`, falling back to `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidValue {
            key: "logging.level".to_string(),
            value: format!("{level} ({e})"),
        }),
    }
}

/// Install the global subscriber.
///
/// Fails if the level is not a valid filter or the log directory cannot
/// be created. Calling it a second time leaves the first subscriber
/// installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, ConfigError> {
    let filter = env_filter(&config.level)?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(LoggingGuard { _file: guard })
}
