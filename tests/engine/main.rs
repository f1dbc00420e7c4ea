//! Integration tests for the embedding host, organized by feature
//!
//! These tests exercise the engine through the public API only.
//!
//! ## GC pressure
//!
//! Set `GC_THRESHOLD` to make the runtime collect more often, which shakes out
//! handle ownership bugs:
//!
//! ```bash
//! cargo test                           # Default runtime threshold
//! GC_THRESHOLD=1 cargo test            # Collect on every allocation
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod builtins;
mod context;
mod evaluate;
mod modules;
mod reflect;
mod value;

use std::rc::Rc;

use quickscript::{BufferedConsoleProvider, Engine, EngineConfig, EngineHost, Value};

/// Default configuration for tests, honouring `GC_THRESHOLD`.
pub fn test_config() -> EngineConfig {
    let config = EngineConfig::default();
    match std::env::var("GC_THRESHOLD")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        Some(threshold) => config.with_gc_threshold(threshold),
        None => config,
    }
}

/// Create a new engine with test defaults. Console output is discarded.
pub fn create_test_engine() -> EngineHost {
    create_test_engine_with_console().0
}

/// Create a new engine whose console output is captured.
pub fn create_test_engine_with_console() -> (EngineHost, BufferedConsoleProvider) {
    create_engine_with(test_config())
}

pub fn create_engine_with(config: EngineConfig) -> (EngineHost, BufferedConsoleProvider) {
    let engine = EngineHost::with_config(config).expect("engine creation failed");
    let console = BufferedConsoleProvider::new();
    engine.set_console(Rc::new(console.clone()));
    (engine, console)
}

/// Evaluate `source` as `test.js` starting at line 1.
pub fn eval(engine: &Engine, source: &str) -> Value {
    engine.evaluate(source, "test.js", 1)
}

/// Evaluate in a fresh engine and convert the result to a number.
pub fn eval_number(source: &str) -> f64 {
    let engine = create_test_engine();
    let result = eval(&engine, source);
    assert!(!result.is_error(), "script failed: {}", result.to_string());
    result.to_number()
}

/// Evaluate in a fresh engine and convert the result to a string.
pub fn eval_string(source: &str) -> String {
    let engine = create_test_engine();
    let result = eval(&engine, source);
    assert!(!result.is_error(), "script failed: {}", result.to_string());
    result.to_string()
}

/// Evaluate in a fresh engine and convert the result to JSON-like data.
pub fn eval_json(source: &str) -> serde_json::Value {
    let engine = create_test_engine();
    let result = eval(&engine, source);
    assert!(!result.is_error(), "script failed: {}", result.to_string());
    result.to_variant()
}

/// Evaluate and return the message of the exception it raised.
pub fn eval_error(source: &str) -> String {
    let engine = create_test_engine();
    let result = eval(&engine, source);
    assert!(result.is_error(), "expected an exception, got {:?}", result);
    result.to_string()
}
