//! Standard console providers.

use super::{ConsoleLevel, ConsoleProvider};
use parking_lot::Mutex;
use std::sync::Arc;

/// Console provider using std print macros.
///
/// Writes to stdout for Log/Info/Debug and stderr for Warn/Error.
pub struct StdConsoleProvider;

impl StdConsoleProvider {
    /// Create a new StdConsoleProvider.
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdConsoleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProvider for StdConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        match level {
            ConsoleLevel::Log | ConsoleLevel::Info | ConsoleLevel::Debug => {
                println!("{message}");
            }
            ConsoleLevel::Warn | ConsoleLevel::Error => {
                eprintln!("{message}");
            }
        }
    }

    fn clear(&self) {
        println!("\n--- Console cleared ---\n");
    }
}

/// Console provider that keeps every line in memory.
///
/// Cloning shares the buffer, so one clone can be handed to the engine while
/// another (possibly on a different thread) reads what was written.
#[derive(Clone, Default)]
pub struct BufferedConsoleProvider {
    lines: Arc<Mutex<Vec<(ConsoleLevel, String)>>>,
}

impl BufferedConsoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all lines written so far.
    pub fn lines(&self) -> Vec<(ConsoleLevel, String)> {
        self.lines.lock().clone()
    }

    /// Messages only, in write order.
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Remove and return everything buffered.
    pub fn take(&self) -> Vec<(ConsoleLevel, String)> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl ConsoleProvider for BufferedConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }

    fn clear(&self) {
        self.lines.lock().clear();
    }
}
