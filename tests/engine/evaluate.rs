//! Evaluation, exception and syntax-check tests

use std::rc::Rc;

use super::{create_test_engine, create_test_engine_with_console, eval, eval_error, eval_number, eval_string};
use quickscript::{ConsoleLevel, EngineError, SyntaxState, Value};

#[test]
fn test_basic_evaluation() {
    assert_eq!(eval_number("1 + 2 * 3"), 7.0);
    assert_eq!(eval_string("'a' + 'b'"), "ab");
    assert_eq!(eval_number("var x = 4; x * x"), 16.0);
}

#[test]
fn test_state_persists_between_evaluations() {
    let engine = create_test_engine();
    eval(&engine, "var counter = 1; function bump() { return ++counter; }");
    eval(&engine, "bump()");
    assert_eq!(eval(&engine, "bump()").to_number(), 3.0);
}

#[test]
fn test_script_error_is_a_value() {
    let message = eval_error("null.x");
    assert!(message.starts_with("TypeError"), "{}", message);
    assert!(eval_error("throw new Error('custom')").contains("custom"));
    assert!(eval_error("var = ;").starts_with("SyntaxError"));
}

#[test]
fn test_uncaught_exception_peek_is_idempotent() {
    let engine = create_test_engine();
    let result = eval(&engine, "throw new Error('peek me')");
    assert!(result.is_error());

    let first = result.to_string();
    let second = result.to_string();
    assert_eq!(first, second);
    assert!(engine.has_uncaught_exception());

    let a = engine.uncaught_exception();
    let b = engine.uncaught_exception();
    assert!(a.strictly_equals(&b));
    assert_eq!(a.property("message").to_string(), "peek me");
    assert!(engine.has_uncaught_exception());
    assert_eq!(engine.uncaught_exception_line_number(), Some(1));
    assert_eq!(engine.uncaught_exception_line_number(), Some(1));

    engine.clear_exceptions();
    assert!(!engine.has_uncaught_exception());
    assert!(!engine.uncaught_exception().is_valid());
}

#[test]
fn test_line_offset_is_applied() {
    let engine = create_test_engine();
    let result = engine.evaluate("var ok = 1;\nthrow new Error('here');", "offset.js", 10);
    assert!(result.is_error());
    assert_eq!(engine.uncaught_exception_line_number(), Some(11));

    match result.to_error() {
        Some(EngineError::Script { message, location }) => {
            assert_eq!(message, "Error: here");
            let location = location.unwrap();
            assert_eq!(location.line, 11);
            assert_eq!(location.file.unwrap().to_string_lossy(), "offset.js");
        }
        other => panic!("unexpected {:?}", other),
    }
    engine.clear_exceptions();
}

#[test]
fn test_uncaught_exception_backtrace() {
    let engine = create_test_engine();
    eval(&engine, "function a() { throw new Error('deep'); }\nfunction b() { a(); }\nb();");
    let frames = engine.uncaught_exception_backtrace();
    let names: Vec<_> = frames.iter().filter_map(|f| f.function_name.as_deref()).collect();
    assert_eq!(&names[..2], ["a", "b"]);
    assert_eq!(frames[0].line, 1);
    assert_eq!(frames[1].line, 2);
    engine.clear_exceptions();
}

#[test]
fn test_stale_exception_does_not_leak_into_next_evaluation() {
    let engine = create_test_engine();
    assert!(engine.evaluate("throw new Error('first')", "a.js", 1).is_error());
    assert!(engine.has_uncaught_exception());

    let second = engine.evaluate("print('x'); 42", "b.js", 1);
    assert!(!second.is_error(), "{}", second.to_string());
    assert_eq!(second.to_number(), 42.0);
    assert!(!engine.has_uncaught_exception());
}

#[test]
fn test_stale_exception_is_reported_as_caught() {
    #[derive(Default)]
    struct CatchCounter {
        caught: std::cell::Cell<usize>,
    }
    impl quickscript::EngineAgent for CatchCounter {
        fn exception_catch(&self, _script_id: quickscript::ScriptId, _exception: &Value) {
            self.caught.set(self.caught.get() + 1);
        }
    }

    let engine = create_test_engine();
    let agent = Rc::new(CatchCounter::default());
    engine.set_agent(Some(agent.clone()));
    eval(&engine, "throw new Error('left pending')");
    assert_eq!(agent.caught.get(), 0);
    eval(&engine, "1");
    assert_eq!(agent.caught.get(), 1);
}

#[test]
fn test_into_result() {
    let engine = create_test_engine();
    assert_eq!(eval(&engine, "5").into_result().unwrap().to_number(), 5.0);
    let err = eval(&engine, "undefinedName").into_result().unwrap_err();
    assert!(err.to_string().contains("undefinedName"));
    engine.clear_exceptions();
}

#[test]
fn test_uncaught_errors_are_logged_only_with_an_agent() {
    struct Quiet;
    impl quickscript::EngineAgent for Quiet {}

    let (engine, console) = create_test_engine_with_console();
    eval(&engine, "throw new Error('silent')");
    engine.clear_exceptions();
    assert!(console.lines().is_empty());

    engine.set_agent(Some(Rc::new(Quiet)));
    engine.evaluate("\nthrow new Error('loud')", "log.js", 1);
    engine.clear_exceptions();
    let lines = console.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].0, ConsoleLevel::Error);
    assert!(lines[0].1.starts_with("log.js:2:"), "{}", lines[0].1);
    assert!(lines[0].1.ends_with("Error: loud"));
}

#[test]
fn test_evaluate_is_not_reentrant() {
    let (engine, console) = create_test_engine_with_console();
    let f = engine.new_function("nested", 0, |ctx| {
        let engine = ctx.engine();
        let inner = engine.evaluate("1", "inner.js", 1);
        let rejected = inner.is_error();
        engine.clear_exceptions();
        Value::from(rejected)
    });
    engine.global_object().set_property("nested", f).unwrap();
    assert!(eval(&engine, "nested()").to_bool());
    assert!(!engine.is_evaluating());
    assert_eq!(console.lines()[0].0, ConsoleLevel::Warn);
}

#[test]
fn test_pending_jobs() {
    let engine = create_test_engine();
    eval(&engine, "var done = 0; Promise.resolve(5).then(function (v) { done = v; });");
    assert_eq!(eval(&engine, "done").to_number(), 0.0);
    assert!(engine.run_pending_jobs() >= 1);
    assert_eq!(eval(&engine, "done").to_number(), 5.0);
    assert_eq!(engine.run_pending_jobs(), 0);
}

#[test]
fn test_rejected_job_leaves_no_pending_exception() {
    let engine = create_test_engine();
    eval(&engine, "var after = 0; Promise.resolve().then(function () { throw new Error('in job'); }).catch(function () { after = 1; });");
    engine.run_pending_jobs();
    assert!(!engine.has_uncaught_exception());
    assert_eq!(eval(&engine, "after").to_number(), 1.0);
}

#[test]
fn test_check_syntax() {
    let engine = create_test_engine();
    assert!(engine.check_syntax("var x = 1; function f() { return x; }").is_valid());

    let broken = engine.check_syntax("var x = ;\nvar y = 2;");
    assert_eq!(broken.state, SyntaxState::Error);
    assert_eq!(broken.line, 1);
    assert!(!broken.message.is_empty());

    let open = engine.check_syntax("function f() {\n  return 1;");
    assert_ne!(open.state, SyntaxState::Valid);

    // Compile-only: nothing ran.
    engine.check_syntax("globalThis.ran = true;");
    assert!(eval(&engine, "typeof ran").to_string() == "undefined");
    assert!(!engine.has_uncaught_exception());
}

#[test]
fn test_global_object_and_constructors() {
    let engine = create_test_engine();
    engine.global_object().set_property("fromHost", 41).unwrap();
    assert_eq!(eval(&engine, "fromHost + 1").to_number(), 42.0);

    assert!(engine.null_value().is_null());
    assert!(engine.undefined_value().is_undefined());
    assert_eq!(engine.new_array(3).length(), 3);
    assert_eq!(engine.new_string("s").to_string(), "s");
    assert!(!engine.new_string("s").is_native());
    let symbol = engine.new_symbol("desc");
    assert!(symbol.is_symbol());
    assert_eq!(symbol.to_string(), "Symbol(desc)");

    let parsed = engine.parse_json(r#"{"a": [1, 2]}"#);
    assert_eq!(parsed.property("a").length(), 2);
    let invalid = engine.parse_json("{");
    assert!(invalid.is_error());
    engine.clear_exceptions();
}

#[test]
fn test_collect_garbage_keeps_live_handles() {
    let engine = create_test_engine();
    let kept = eval(&engine, "({ data: 'still here' })");
    eval(&engine, "for (var i = 0; i < 1000; i++) { ({ junk: i }); }");
    engine.collect_garbage();
    assert_eq!(kept.property("data").to_string(), "still here");
}

#[test]
fn test_shutdown_is_idempotent() {
    let engine = create_test_engine();
    engine.shutdown();
    engine.shutdown();
    assert!(engine.is_closed());
    assert!(!engine.evaluate("1", "t.js", 1).is_valid());
    assert!(!engine.global_object().is_valid());
}
