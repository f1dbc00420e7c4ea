//! CLI for running scripts on the embedding host
//!
//! Usage: quickscript [options] <script.js>
//!
//! Options:
//!   --timeout <ms>       Abort the evaluation after this many milliseconds
//!   --base-dir <dir>     Root for resolving imports (default: the script's directory)
//!   --config <file>      Engine configuration as JSON
//!   --break <line>       Pause at a line of the script; may be repeated
//!   --check              Only check the script's syntax
//!
//! Exit status is 1 for script errors and 2 when the evaluation was cancelled.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use quickscript::{
    DebugAgent, DebugEvent, EngineConfig, EngineHost, StackFrame, SyntaxState,
};

const EXIT_SCRIPT_ERROR: i32 = 1;
const EXIT_CANCELLED: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_SCRIPT_ERROR);
        }
    }
}

/// CLI configuration
struct Config {
    script_path: PathBuf,
    timeout_ms: Option<u64>,
    base_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
    breakpoints: Vec<u32>,
    check_only: bool,
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map_or("quickscript", |s| s.as_str());

    let mut timeout_ms: Option<u64> = None;
    let mut base_dir: Option<PathBuf> = None;
    let mut config_file: Option<PathBuf> = None;
    let mut breakpoints = Vec::new();
    let mut check_only = false;
    let mut script_arg: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        let Some(arg) = args.get(i) else {
            break;
        };
        match arg.as_str() {
            "--timeout" => {
                i += 1;
                timeout_ms = Some(
                    args.get(i)
                        .ok_or_else(|| "--timeout requires a value".to_string())?
                        .parse::<u64>()
                        .map_err(|_| "--timeout must be a positive integer".to_string())?,
                );
            }
            "--base-dir" => {
                i += 1;
                base_dir = Some(PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| "--base-dir requires a value".to_string())?,
                ));
            }
            "--config" => {
                i += 1;
                config_file = Some(PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| "--config requires a value".to_string())?,
                ));
            }
            "--break" => {
                i += 1;
                breakpoints.push(
                    args.get(i)
                        .ok_or_else(|| "--break requires a line number".to_string())?
                        .parse::<u32>()
                        .map_err(|_| "--break must be a line number".to_string())?,
                );
            }
            "--check" => check_only = true,
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            other => script_arg = Some(other),
        }
        i += 1;
    }

    let script_arg = script_arg.ok_or_else(|| {
        format!(
            "Usage: {} [--timeout <ms>] [--base-dir <dir>] [--config <file>] [--break <line>]... [--check] <script.js>",
            program_name
        )
    })?;

    Ok(Config {
        script_path: PathBuf::from(script_arg),
        timeout_ms,
        base_dir,
        config_file,
        breakpoints,
        check_only,
    })
}

/// Format an error with file context and backtrace
fn format_error(message: &str, file: &str, line: Option<u32>, backtrace: &[StackFrame]) -> String {
    let mut msg = match line {
        Some(line) => format!("{}\n\n  File: {}:{}", message, file, line),
        None => format!("{}\n\n  File: {}", message, file),
    };
    if !backtrace.is_empty() {
        msg.push_str("\n\n  Backtrace:");
        for frame in backtrace {
            msg.push('\n');
            msg.push_str(&frame.to_string());
        }
    }
    msg
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_SCRIPT_ERROR);
        }
    };

    let script_path = config.script_path;
    let source = fs::read_to_string(&script_path)
        .map_err(|e| format!("Cannot read {}: {}", script_path.display(), e))?;
    let file_name = script_path.display().to_string();

    let mut engine_config = match &config.config_file {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = config.base_dir {
        engine_config.base_dir = dir;
    } else if config.config_file.is_none() {
        if let Some(parent) = script_path.parent() {
            engine_config.base_dir = parent.to_path_buf();
        }
    }

    let engine = EngineHost::with_config(engine_config)?;

    if config.check_only {
        let result = engine.check_syntax(&source);
        return Ok(match result.state {
            SyntaxState::Valid => {
                println!("{}: syntax OK", file_name);
                0
            }
            SyntaxState::Intermediate | SyntaxState::Error => {
                eprintln!(
                    "{}:{}:{}: {}",
                    file_name,
                    result.line,
                    result.column,
                    result.message
                );
                EXIT_SCRIPT_ERROR
            }
        });
    }

    if !config.breakpoints.is_empty() {
        let controller = DebugAgent::attach(&engine);
        for line in &config.breakpoints {
            controller.add_breakpoint(&file_name, *line);
        }
        thread::spawn(move || {
            for event in controller.events().iter() {
                if let DebugEvent::Paused { position, reason } = event {
                    eprintln!(
                        "[debug] paused at {} ({:?}, depth {})",
                        position,
                        reason,
                        controller.current_depth()
                    );
                    controller.continue_execution();
                }
            }
        });
    }

    if let Some(ms) = config.timeout_ms {
        let abort = engine.abort_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            abort.abort();
        });
    }

    let result = engine.evaluate(&source, &file_name, 1);
    engine.run_pending_jobs();

    if result.is_cancelled() {
        eprintln!("Evaluation cancelled");
        return Ok(EXIT_CANCELLED);
    }
    if result.is_error() {
        let message = result.to_string();
        let line = engine.uncaught_exception_line_number();
        let backtrace = engine.uncaught_exception_backtrace();
        eprintln!("{}", format_error(&message, &file_name, line, &backtrace));
        engine.clear_exceptions();
        return Ok(EXIT_SCRIPT_ERROR);
    }
    if !result.is_undefined() && result.is_valid() {
        println!("{}", result.to_string());
    }
    Ok(0)
}
