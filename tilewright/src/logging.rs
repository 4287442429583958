//! Tracing setup for hosts embedding tilewright.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the host. [`init_logging`] is a ready-made one: a compact stdout layer plus
//! a truncated-per-session log file written off-thread.
//!
//! Filtering follows `RUST_LOG` and falls back to [`DEFAULT_FILTER`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Keeps the background log writer alive.
///
/// Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    log_path: PathBuf,
}

impl LoggingGuard {
    /// Path of the active log file.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Creates `log_dir` if needed and truncates `log_dir/log_file`.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<PathBuf, LoggingError> {
    let log_path = log_dir.join(log_file);
    fs::create_dir_all(log_dir)
        .and_then(|_| fs::write(&log_path, ""))
        .map_err(|source| LoggingError::LogFile {
            path: log_path.clone(),
            source,
        })?;
    Ok(log_path)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber.
///
/// Output goes to stdout (with ANSI colors) and to `log_dir/log_file`
/// (plain). The file is cleared on every call.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, LoggingError> {
    let log_path = prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_path,
    })
}

/// Default log directory.
pub fn default_log_dir() -> &'static Path {
    Path::new("logs")
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "tilewright.log"
}
