//! Parsing of QuickJS `stack` strings.
//!
//! The runtime formats each frame as `    at NAME (FILE:LINE:COL)` for script
//! functions, `    at NAME (native)` for host functions and `    at FILE:LINE:COL`
//! for the location line it prepends to syntax errors.

use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::error::StackFrame;

static SCRIPT_FRAME: LazyLock<Result<Regex, fancy_regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*at (.*?) \((.+?)(?::(\d+):(\d+))?\)\s*$"));

static BARE_LOCATION: LazyLock<Result<Regex, fancy_regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*at ([^()]+):(\d+):(\d+)\s*$"));

/// A script location as reported to debuggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

fn parse_number(text: Option<fancy_regex::Match<'_>>) -> u32 {
    text.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

/// Parse a single backtrace line.
pub(crate) fn parse_frame(line: &str) -> Option<StackFrame> {
    if let Ok(re) = SCRIPT_FRAME.as_ref() {
        if let Ok(Some(caps)) = re.captures(line) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let location = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let function_name = match name {
                "" | "<anonymous>" => None,
                other => Some(other.to_string()),
            };
            if location == "native" {
                return Some(StackFrame {
                    function_name,
                    file: None,
                    line: 0,
                    column: 0,
                });
            }
            return Some(StackFrame {
                function_name,
                file: Some(location.to_string()),
                line: parse_number(caps.get(3)),
                column: parse_number(caps.get(4)),
            });
        }
    }
    if let Ok(re) = BARE_LOCATION.as_ref() {
        if let Ok(Some(caps)) = re.captures(line) {
            return Some(StackFrame {
                function_name: None,
                file: caps.get(1).map(|m| m.as_str().to_string()),
                line: parse_number(caps.get(2)),
                column: parse_number(caps.get(3)),
            });
        }
    }
    None
}

/// Parse every recognizable frame of a stack string, innermost first.
pub(crate) fn parse_stack(stack: &str) -> Vec<StackFrame> {
    stack.lines().filter_map(parse_frame).collect()
}

/// First frame that belongs to a script, skipping host frames.
pub(crate) fn innermost_script_frame(stack: &str) -> Option<StackFrame> {
    stack
        .lines()
        .filter_map(parse_frame)
        .find(|frame| !frame.is_native() && frame.line > 0)
}

pub(crate) fn innermost_script_position(stack: &str) -> Option<Position> {
    innermost_script_frame(stack).map(|frame| Position {
        file: frame.file.unwrap_or_default(),
        line: frame.line,
        column: frame.column,
    })
}
