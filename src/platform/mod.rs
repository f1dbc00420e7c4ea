//! Host output abstraction.
//!
//! The engine never prints directly. Script `console.*` calls, uncaught-exception
//! reports and host diagnostics all go through a [`ConsoleProvider`], so embedders
//! decide where log lines end up (terminal, UI log pane, test buffer).

mod std_impl;

pub use std_impl::{BufferedConsoleProvider, StdConsoleProvider};

/// Log level for console output.
///
/// Maps to the different console methods: console.log(), console.warn(), etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    /// console.log() and print() - general output
    Log,
    /// console.info() - informational messages
    Info,
    /// console.debug() - debug messages
    Debug,
    /// console.warn() and host warnings
    Warn,
    /// console.error() and uncaught exceptions
    Error,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        }
    }
}

/// Trait for handling console output.
pub trait ConsoleProvider {
    /// Write a message at the specified log level.
    fn write(&self, level: ConsoleLevel, message: &str);

    /// Clear the console (optional operation, may be no-op).
    fn clear(&self) {}
}

/// A console provider that discards all output.
pub struct NoOpConsoleProvider;

impl ConsoleProvider for NoOpConsoleProvider {
    fn write(&self, _level: ConsoleLevel, _message: &str) {}
}
