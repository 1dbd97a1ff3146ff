// src/diagnostics.rs

//! Leveled run log
//!
//! Thin layer over `tracing` with the five levels packaging output uses.
//! Logging at [`LogLevel::Error`] also marks the run as failed; the
//! generator checks [`RunLog::error_occurred`] between steps and aborts.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

/// Message levels understood by the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Progress messages shown to the user
    Output,
    /// Additional detail
    Verbose,
    /// Developer diagnostics
    Debug,
    Warning,
    Error,
}

/// Log for a single packaging run
#[derive(Debug)]
pub struct RunLog {
    generator: String,
    error_occurred: AtomicBool,
}

impl RunLog {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            error_occurred: AtomicBool::new(false),
        }
    }

    /// Name of the generator this log belongs to
    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let generator = self.generator.as_str();
        match level {
            LogLevel::Output => info!(generator, "{}", message),
            LogLevel::Verbose => debug!(generator, "{}", message),
            LogLevel::Debug => trace!(generator, "{}", message),
            LogLevel::Warning => warn!(generator, "{}", message),
            LogLevel::Error => {
                error!(generator, "{}", message);
                self.error_occurred.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn output(&self, message: &str) {
        self.log(LogLevel::Output, message);
    }

    pub fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Has an error been logged during this run?
    pub fn error_occurred(&self) -> bool {
        self.error_occurred.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sets_flag() {
        let log = RunLog::new("TGZ");
        log.output("packaging");
        log.verbose("detail");
        log.debug("noise");
        log.warning("careful");
        assert!(!log.error_occurred());

        log.error("broken");
        assert!(log.error_occurred());
        assert_eq!(log.generator(), "TGZ");
    }
}
