#![deny(missing_docs)]
//! Shared logging utilities for the archive server workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! the process-wide logger setup for the server binary and a minimal test
//! initializer for the global logger.
//!
//! Standard output carries protocol packets, so nothing here ever writes to it:
//! terminal output goes to stderr and, optionally, to a log file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    ThreadLogMode, WriteLogger,
};

/// File name used for the log file inside the configured log directory.
pub const LOG_FILE_NAME: &str = "server.log";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Where and how verbosely the server logs.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Maximum level written by every sink.
    pub level: LevelFilter,
    /// Directory receiving [`LOG_FILE_NAME`]; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl LogSettings {
    /// Settings for the server: `Debug` when `debug` is set, `Info` otherwise.
    pub fn for_server(debug: bool, log_dir: Option<PathBuf>) -> Self {
        let level = if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        Self { level, log_dir }
    }
}

/// Initializes the global logger: stderr terminal output plus an optional log file.
///
/// Returns the path of the log file when one was created. Failing to create the
/// log file is an error; a logger that was already installed is left in place.
pub fn initialize(settings: &LogSettings) -> io::Result<Option<PathBuf>> {
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        settings.level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_path = match settings.log_dir.as_deref() {
        Some(dir) => {
            let (path, file) = create_log_file(dir)?;
            loggers.push(WriteLogger::new(settings.level, config, file));
            Some(path)
        }
        None => None,
    };

    let _ = CombinedLogger::init(loggers);
    Ok(log_path)
}

/// Initializes a simple stderr logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )]);
}

// Job threads are named after their job id, so the thread column identifies
// which job produced a line.
fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Names)
        .build()
}

fn create_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = File::create(&path)?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_settings_pick_level_from_debug_flag() {
        assert_eq!(LogSettings::for_server(false, None).level, LevelFilter::Info);
        assert_eq!(LogSettings::for_server(true, None).level, LevelFilter::Debug);
    }

    #[test]
    fn log_file_is_created_inside_missing_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("logs");

        let (path, _file) = create_log_file(&dir).unwrap();

        assert_eq!(path, dir.join(LOG_FILE_NAME));
        assert!(path.is_file());
    }
}
