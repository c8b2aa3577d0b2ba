/// Kludge engine - global services shared by every component
///
/// Holds the process-wide logger. Everything GPU-related is owned explicitly
/// by a `Presenter` or a `ResourceScope`, never by a global.

use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Engine-wide services
pub struct Engine;

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

fn dispatch(severity: LogSeverity, source: &str, message: String, location: Option<(&'static str, u32)>) {
    // poisoned slot: the entry is dropped
    let Ok(logger) = logger_slot().read() else { return };
    logger.log(&LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: source.to_string(),
        message,
        file: location.map(|(file, _)| file),
        line: location.map(|(_, line)| line),
    });
}

impl Engine {
    /// Set a custom logger
    ///
    /// Replaces the default console logger with a custom implementation.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kludge_engine::kludge::Engine;
    /// use kludge_engine::kludge::log::{Logger, LogEntry};
    ///
    /// struct SilentLogger;
    ///
    /// impl Logger for SilentLogger {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(SilentLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut slot) = logger_slot().write() {
            *slot = Box::new(logger);
        }
    }

    /// Put the console logger back
    pub fn reset_logger() {
        Self::set_logger(DefaultLogger);
    }

    /// Log without location; backs `engine_trace!` .. `engine_warn!`
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        dispatch(severity, source, message, None);
    }

    /// Log with the caller's file:line; backs `engine_error!` and the error-building macros
    pub fn log_detailed(severity: LogSeverity, source: &str, message: String, file: &'static str, line: u32) {
        dispatch(severity, source, message, Some((file, line)));
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
