//! Value handle tests

use super::{create_test_engine, eval, eval_json};
use quickscript::{PropertyFlags, PropertyIterator, Value, Variant};
use serde_json::json;

#[test]
fn test_clone_and_drop_balance_ref_counts() {
    let engine = create_test_engine();
    let object = engine.new_object();
    let before = object.foreign_ref_count().unwrap();
    let handles_before = engine.live_handle_count();

    let copies: Vec<Value> = (0..5).map(|_| object.clone()).collect();
    assert_eq!(object.foreign_ref_count().unwrap(), before + 5);
    assert_eq!(engine.live_handle_count(), handles_before + 5);

    drop(copies);
    assert_eq!(object.foreign_ref_count().unwrap(), before);
    assert_eq!(engine.live_handle_count(), handles_before);
}

#[test]
fn test_property_reads_do_not_leak() {
    let engine = create_test_engine();
    let object = eval(&engine, "({ inner: { x: 1 } })");
    let inner = object.property("inner");
    let before = inner.foreign_ref_count().unwrap();
    for _ in 0..10 {
        let again = object.property("inner");
        assert!(again.strictly_equals(&inner));
    }
    assert_eq!(inner.foreign_ref_count().unwrap(), before);
}

#[test]
fn test_type_predicates() {
    let engine = create_test_engine();
    assert!(eval(&engine, "undefined").is_undefined());
    assert!(eval(&engine, "null").is_null());
    assert!(eval(&engine, "true").is_bool());
    assert!(eval(&engine, "1.5").is_number());
    assert!(eval(&engine, "'s'").is_string());
    assert!(eval(&engine, "Symbol('s')").is_symbol());
    assert!(eval(&engine, "[1]").is_array());
    assert!(eval(&engine, "(function () {})").is_function());
    assert!(eval(&engine, "new Error('e')").is_error_object());
    assert!(eval(&engine, "new Date(0)").is_date());
    assert!(eval(&engine, "Promise.resolve(1)").is_promise());
    assert!(eval(&engine, "({})").is_object());
}

#[test]
fn test_conversions() {
    let engine = create_test_engine();
    assert_eq!(eval(&engine, "'12'").to_number(), 12.0);
    assert_eq!(eval(&engine, "3.9").to_int32(), 3);
    assert_eq!(eval(&engine, "2 ** 32 + 5").to_int32(), 5);
    assert!(eval(&engine, "'x'").to_bool());
    assert!(!eval(&engine, "0").to_bool());
    assert!(eval(&engine, "({})").to_bool());
    assert!(!eval(&engine, "''").to_bool());
    assert!(!eval(&engine, "NaN").to_bool());
    assert!(!eval(&engine, "undefined").to_bool());
    assert_eq!(eval(&engine, "[1, 2]").to_string(), "1,2");
}

#[test]
fn test_to_variant_nested() {
    assert_eq!(
        eval_json("({ a: 1, b: [true, 'x', null], c: { d: 2.5 }, f: function () {} })"),
        json!({ "a": 1, "b": [true, "x", null], "c": { "d": 2.5 }, "f": null })
    );
}

#[test]
fn test_to_variant_depth_limit() {
    let nested = eval_json("var o = {}; var cur = o; for (var i = 0; i < 20; i++) { cur.n = {}; cur = cur.n; } o");
    let mut depth = 0;
    let mut cur = &nested;
    while let Some(next) = cur.get("n") {
        depth += 1;
        cur = next;
    }
    assert!(depth < 20);
    assert!(cur.is_null());
}

#[test]
fn test_native_values_materialize_on_demand() {
    let engine = create_test_engine();
    let object = engine.new_object();
    object.set_property("s", "text").unwrap();
    object.set_property("n", 4.0).unwrap();
    object.set_property("b", true).unwrap();
    let global = engine.global_object();
    global.set_property("obj", object).unwrap();
    assert_eq!(
        eval(&engine, "typeof obj.s + typeof obj.n + typeof obj.b").to_string(),
        "stringnumberboolean"
    );

    let materialized = engine.new_variant(Variant::Number(7.0));
    assert!(!materialized.is_native());
    assert_eq!(materialized.to_number(), 7.0);
}

#[test]
fn test_property_access() {
    let engine = create_test_engine();
    let object = engine.new_object();
    object.set_property("x", 1).unwrap();
    assert!(object.has_property("x"));
    assert_eq!(object.property("x").to_number(), 1.0);
    assert!(object.delete_property("x"));
    assert!(!object.has_property("x"));
    assert!(object.property("x").is_undefined());

    let array = engine.new_array(0);
    array.set_property_at(0, "a").unwrap();
    array.set_property_at(2, "c").unwrap();
    assert_eq!(array.length(), 3);
    assert_eq!(array.property_at(2).to_string(), "c");
    assert!(array.property_at(1).is_undefined());
}

#[test]
fn test_read_only_and_hidden_properties() {
    let engine = create_test_engine();
    let object = engine.new_object();
    object
        .set_property_with_flags("fixed", 1, PropertyFlags::READ_ONLY | PropertyFlags::UNDELETABLE)
        .unwrap();
    object
        .set_property_with_flags("hidden", 2, PropertyFlags::SKIP_IN_ENUMERATION)
        .unwrap();
    object.set_property("shown", 3).unwrap();

    assert!(object.set_property("fixed", 5).is_err());
    assert!(!engine.has_uncaught_exception());
    assert_eq!(object.property("fixed").to_number(), 1.0);
    assert!(!object.delete_property("fixed"));

    engine.global_object().set_property("obj", object).unwrap();
    // Read-only does not imply hidden.
    assert_eq!(eval(&engine, "Object.keys(obj).join()").to_string(), "fixed,shown");
}

#[test]
fn test_accessor_properties() {
    let engine = create_test_engine();
    let object = engine.new_object();
    let getter = eval(&engine, "(function () { return this._v * 2; })");
    let setter = eval(&engine, "(function (v) { this._v = v; })");
    object
        .set_property_with_flags("double", getter, PropertyFlags::PROPERTY_GETTER)
        .unwrap();
    object
        .set_property_with_flags("double", setter, PropertyFlags::PROPERTY_SETTER)
        .unwrap();
    object.set_property("double", 21).unwrap();
    assert_eq!(object.property("double").to_number(), 42.0);
}

#[test]
fn test_call_and_construct() {
    let engine = create_test_engine();
    let add = eval(&engine, "(function (a, b) { return a + b + (this.base || 0); })");
    let this = engine.new_object();
    this.set_property("base", 100).unwrap();
    let result = add.call(&this, &[Value::from(1), Value::from(2)]);
    assert_eq!(result.to_number(), 103.0);

    let point = eval(&engine, "(function Point(x) { this.x = x; })");
    let instance = point.construct(&[Value::from(9)]);
    assert_eq!(instance.property("x").to_number(), 9.0);

    let thrower = eval(&engine, "(function () { throw new TypeError('nope'); })");
    let failed = thrower.call(&engine.undefined_value(), &[]);
    assert!(failed.is_error());
    assert!(failed.to_string().contains("nope"));
    engine.clear_exceptions();
}

#[test]
fn test_equality() {
    let engine = create_test_engine();
    let nan = eval(&engine, "NaN");
    assert!(!nan.strictly_equals(&nan));
    assert!(nan.equals(&nan));

    let a = eval(&engine, "globalThis.shared = {}");
    let b = eval(&engine, "shared");
    assert!(a.strictly_equals(&b));
    assert_eq!(a.identity(), b.identity());
    assert!(!a.strictly_equals(&engine.new_object()));

    assert!(eval(&engine, "'x'").strictly_equals(&Value::from("x")));
    assert!(Value::from(1).strictly_equals(&eval(&engine, "1")));
}

#[test]
fn test_property_iterator_order_and_symbols() {
    let engine = create_test_engine();
    let object = eval(
        &engine,
        "var s = Symbol('tag'); var o = { b: 1, a: 2, 1: 'one' }; o[s] = 3; Object.defineProperty(o, 'hidden', { value: 4 }); o",
    );
    let props: Vec<_> = PropertyIterator::new(&object).collect();
    let names: Vec<&str> = props.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["1", "b", "a", "Symbol(tag)"]);
    assert!(props[3].key.is_symbol());
    assert_eq!(props[3].value.to_number(), 3.0);
}

#[test]
fn test_handles_outlive_shutdown_as_invalid() {
    let engine = create_test_engine();
    let kept = eval(&engine, "({ x: 1 })");
    assert!(kept.is_valid());
    drop(engine);
    assert!(!kept.is_valid());
    assert!(!kept.property("x").is_valid());
    assert_eq!(kept.to_string(), "");
}
