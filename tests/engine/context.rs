//! Execution context tests

use std::cell::RefCell;
use std::rc::Rc;

use super::{create_test_engine, eval};
use quickscript::{ContextInfo, ErrorKind, Value};

#[test]
fn test_arguments() {
    let engine = create_test_engine();
    let f = engine.new_function("count", 0, |ctx| {
        let first = ctx.argument(0).to_string();
        let missing = ctx.argument(5).is_valid();
        Value::from(format!("{}:{}:{}", ctx.argument_count(), first, missing))
    });
    engine.global_object().set_property("count", f).unwrap();
    assert_eq!(eval(&engine, "count('a', 2, true)").to_string(), "3:a:false");
    assert_eq!(eval(&engine, "count()").to_string(), "0::false");
}

#[test]
fn test_arguments_object() {
    let engine = create_test_engine();
    let f = engine.new_function("args", 0, |ctx| ctx.arguments_object());
    engine.global_object().set_property("args", f).unwrap();
    assert_eq!(
        eval(&engine, "JSON.stringify(args(1, 'x', null))").to_string(),
        r#"[1,"x",null]"#
    );
}

#[test]
fn test_this_object() {
    let engine = create_test_engine();
    let f = engine.new_function("getName", 0, |ctx| ctx.this_object().property("name"));
    engine.global_object().set_property("getName", f).unwrap();
    assert_eq!(
        eval(&engine, "var o = { name: 'obj', getName: getName }; o.getName()").to_string(),
        "obj"
    );
}

#[test]
fn test_throw_error_is_catchable() {
    let engine = create_test_engine();
    let f = engine.new_function("fail", 0, |ctx| ctx.throw_error(ErrorKind::RangeError, "out of range"));
    engine.global_object().set_property("fail", f).unwrap();
    assert_eq!(
        eval(&engine, "try { fail(); 'no' } catch (e) { e instanceof RangeError ? e.message : 'wrong' }")
            .to_string(),
        "out of range"
    );
    assert!(!engine.has_uncaught_exception());

    let uncaught = eval(&engine, "fail()");
    assert!(uncaught.is_error());
    assert_eq!(uncaught.to_string(), "RangeError: out of range");
    engine.clear_exceptions();
}

#[test]
fn test_throw_value() {
    let engine = create_test_engine();
    let f = engine.new_function("raise", 1, |ctx| {
        let value = ctx.argument(0);
        ctx.throw_value(value)
    });
    engine.global_object().set_property("raise", f).unwrap();
    assert_eq!(
        eval(&engine, "try { raise({ code: 7 }) } catch (e) { e.code }").to_number(),
        7.0
    );
}

#[test]
fn test_context_info_reports_caller() {
    let engine = create_test_engine();
    let seen: Rc<RefCell<Option<ContextInfo>>> = Rc::default();
    let sink = seen.clone();
    let f = engine.new_function("probe", 0, move |ctx| {
        *sink.borrow_mut() = Some(ctx.info());
        Value::invalid()
    });
    engine.global_object().set_property("probe", f).unwrap();
    engine.evaluate("var a = 1;\n\n  probe();\n", "ctx.js", 1);

    let info = seen.borrow().clone().unwrap();
    assert_eq!(info.function_name.as_deref(), Some("probe"));
    assert_eq!(info.file.as_deref(), Some("ctx.js"));
    assert_eq!(info.line, 3);
}

#[test]
fn test_backtrace_lists_script_frames() {
    let engine = create_test_engine();
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = seen.clone();
    let f = engine.new_function("trace", 0, move |ctx| {
        *sink.borrow_mut() = ctx
            .backtrace()
            .iter()
            .filter_map(|frame| frame.function_name.clone())
            .collect();
        Value::invalid()
    });
    engine.global_object().set_property("trace", f).unwrap();
    eval(&engine, "function inner() { trace(); }\nfunction outer() { inner(); }\nouter();");

    let names = seen.borrow().clone();
    let inner = names.iter().position(|n| n == "inner").unwrap();
    let outer = names.iter().position(|n| n == "outer").unwrap();
    assert!(inner < outer);
}

#[test]
fn test_callee_is_the_function() {
    let engine = create_test_engine();
    let f = engine.new_function("self", 0, |ctx| ctx.callee());
    engine.global_object().set_property("self", f).unwrap();
    assert!(eval(&engine, "self() === self").to_bool());
}
