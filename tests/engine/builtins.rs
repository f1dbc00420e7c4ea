//! Global host functions: console, print and sleep

use std::time::{Duration, Instant};

use super::{create_engine_with, create_test_engine, create_test_engine_with_console, eval, test_config};
use quickscript::ConsoleLevel;

#[test]
fn test_console_levels() {
    let (engine, console) = create_test_engine_with_console();
    eval(
        &engine,
        "console.log('l'); console.info('i'); console.debug('d'); console.warn('w'); console.error('e');",
    );
    assert_eq!(
        console.lines(),
        [
            (ConsoleLevel::Log, "l".to_string()),
            (ConsoleLevel::Info, "i".to_string()),
            (ConsoleLevel::Debug, "d".to_string()),
            (ConsoleLevel::Warn, "w".to_string()),
            (ConsoleLevel::Error, "e".to_string()),
        ]
    );
}

#[test]
fn test_print_joins_arguments() {
    let (engine, console) = create_test_engine_with_console();
    eval(&engine, "print('a', 1, true, null, undefined);");
    assert_eq!(console.messages(), ["a 1 true null undefined"]);
}

#[test]
fn test_objects_print_as_json() {
    let (engine, console) = create_test_engine_with_console();
    eval(
        &engine,
        "console.log({ a: 1, b: [1, 'x'] }); console.log(new Error('boom')); console.log(function f() {});",
    );
    let messages = console.messages();
    assert_eq!(messages[0], r#"{"a":1,"b":[1,"x"]}"#);
    assert_eq!(messages[1], "Error: boom");
    assert!(messages[2].starts_with("function f"));
}

#[test]
fn test_sleep_returns_undefined() {
    let engine = create_test_engine();
    let start = Instant::now();
    assert_eq!(eval(&engine, "typeof sleep(5)").to_string(), "undefined");
    assert!(start.elapsed() >= Duration::from_millis(5));

    // Negative and non-numeric durations return at once.
    assert!(!eval(&engine, "sleep(-1); sleep('soon'); sleep()").is_error());
}

#[test]
fn test_builtins_can_be_disabled() {
    let (engine, _) = create_engine_with(test_config().with_builtins(false));
    assert_eq!(eval(&engine, "typeof console").to_string(), "undefined");
    assert_eq!(eval(&engine, "typeof print").to_string(), "undefined");
    assert_eq!(eval(&engine, "typeof sleep").to_string(), "undefined");
}

#[test]
fn test_builtins_are_registered_natives() {
    let engine = create_test_engine();
    let print = engine.global_object().property("print");
    assert!(engine.dispatch_index_of(&print).is_some());
    assert_eq!(eval(&engine, "sleep.length").to_number(), 1.0);
}
