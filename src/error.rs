//! Error types for the embedding host

use std::path::PathBuf;
use thiserror::Error;

/// Source location information for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file.display(), self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// One frame of a script backtrace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: Option<String>,
    /// `None` for native frames
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    pub fn is_native(&self) -> bool {
        self.file.is_none()
    }
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.function_name.as_deref().unwrap_or("<anonymous>");
        match &self.file {
            Some(file) => write!(
                f,
                "    at {} ({}:{}:{})",
                name, file, self.line, self.column
            ),
            None => write!(f, "    at {} (native)", name),
        }
    }
}

/// Kind of exception raised by [`crate::ExecutionContext::throw_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    UriError,
    InternalError,
}

impl ErrorKind {
    /// Name of the global error constructor for this kind.
    pub fn constructor_name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::UriError => "URIError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

/// Host-side failures.
///
/// Script exceptions are not errors at this layer: they travel as exception-flagged
/// [`crate::Value`]s. `EngineError` covers what goes wrong around the script, and
/// [`crate::Value::to_error`] converts an exception value when host code wants `?`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}{}", format_location(.location))]
    Script {
        message: String,
        location: Option<SourceLocation>,
    },

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("invalid name {0:?}: contains a NUL byte")]
    InvalidName(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("cannot resolve module '{specifier}' from {}", .base.display())]
    ModuleNotFound { specifier: String, base: PathBuf },

    #[error("engine has been shut down")]
    HostState,

    #[error("failed to initialize runtime: {0}")]
    Init(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_location(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

impl EngineError {
    pub fn script(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        EngineError::Script {
            message: message.into(),
            location,
        }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        EngineError::Registration(message.into())
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        EngineError::InvalidName(name.into())
    }
}
