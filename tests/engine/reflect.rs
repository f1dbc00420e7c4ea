//! Reflection bridge tests

use std::cell::RefCell;
use std::rc::Rc;

use super::{create_test_engine, eval};
use quickscript::{Capability, HostObject, Ownership, Variant};

static COUNTER_CAPABILITIES: &[Capability] = &[
    Capability::property("count"),
    Capability::read_only("label"),
    Capability::method("add", 1),
    Capability::method("describe", 0),
    Capability::method("join", 10),
];

struct Counter {
    count: f64,
    label: String,
}

impl Counter {
    fn shared() -> Rc<RefCell<Counter>> {
        Rc::new(RefCell::new(Counter {
            count: 0.0,
            label: "clicks".to_string(),
        }))
    }
}

impl HostObject for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn capabilities(&self) -> &'static [Capability] {
        COUNTER_CAPABILITIES
    }

    fn get_property(&self, name: &str) -> Option<Variant> {
        match name {
            "count" => Some(Variant::Number(self.count)),
            "label" => Some(Variant::String(self.label.clone())),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Variant) -> Result<(), String> {
        match (name, value) {
            ("count", Variant::Number(n)) if n >= 0.0 => {
                self.count = n;
                Ok(())
            }
            ("count", _) => Err("count must be a non-negative number".to_string()),
            _ => Err(format!("{} is read-only", name)),
        }
    }

    fn invoke(&mut self, method: &str, args: &[String]) -> Result<String, String> {
        match method {
            "add" => {
                let n: f64 = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| "add expects a number".to_string())?;
                self.count += n;
                Ok(self.count.to_string())
            }
            "describe" => Ok(format!("{}={}", self.label, self.count)),
            "join" => Ok(args.join("+")),
            other => Err(format!("unknown method {}", other)),
        }
    }
}

#[test]
fn test_properties_and_methods() {
    let engine = create_test_engine();
    let counter = Counter::shared();
    let object = engine.new_host_object(counter.clone(), Ownership::HostOwned);
    assert!(object.is_valid());
    engine.global_object().set_property("counter", object).unwrap();

    assert_eq!(eval(&engine, "counter.label").to_string(), "clicks");
    eval(&engine, "counter.count = 4;");
    assert_eq!(counter.borrow().count, 4.0);
    assert_eq!(eval(&engine, "counter.add(6)").to_string(), "10");
    assert_eq!(eval(&engine, "counter.count").to_number(), 10.0);
    assert_eq!(eval(&engine, "counter.describe()").to_string(), "clicks=10");
    assert_eq!(eval(&engine, "String(counter)").to_string(), "[object Counter]");
}

#[test]
fn test_method_results_are_strings() {
    let engine = create_test_engine();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    engine.global_object().set_property("counter", object).unwrap();
    assert_eq!(eval(&engine, "typeof counter.add(1)").to_string(), "string");
    assert_eq!(eval(&engine, "counter.join(1, true, 'x')").to_string(), "1+true+x");
}

#[test]
fn test_enumeration_lists_properties_only() {
    let engine = create_test_engine();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    assert_eq!(
        engine.host_members(&object),
        ["count", "label", "add", "describe", "join"]
    );
    engine.global_object().set_property("counter", object).unwrap();
    assert_eq!(eval(&engine, "Object.keys(counter).join()").to_string(), "count,label");
}

#[test]
fn test_host_errors_become_script_errors() {
    let engine = create_test_engine();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    engine.global_object().set_property("counter", object).unwrap();

    assert_eq!(
        eval(&engine, "try { counter.count = -1; 'set' } catch (e) { e.name + ': ' + e.message }").to_string(),
        "TypeError: count must be a non-negative number"
    );
    assert_eq!(
        eval(&engine, "try { counter.add('x'); 'called' } catch (e) { e.message }").to_string(),
        "add expects a number"
    );
    assert_eq!(
        eval(&engine, "(function () { 'use strict'; try { counter.label = 'x'; return 'set'; } catch (e) { return e.name; } })()")
            .to_string(),
        "TypeError"
    );
}

#[test]
fn test_argument_limit() {
    let engine = create_test_engine();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    engine.global_object().set_property("counter", object).unwrap();
    assert_eq!(
        eval(&engine, "counter.join(1,2,3,4,5,6,7,8,9,10)").to_string(),
        "1+2+3+4+5+6+7+8+9+10"
    );
    assert_eq!(
        eval(&engine, "try { counter.join(1,2,3,4,5,6,7,8,9,10,11) } catch (e) { e.name }").to_string(),
        "RangeError"
    );
}

#[test]
fn test_host_owned_object_can_be_destroyed() {
    let engine = create_test_engine();
    let counter = Counter::shared();
    let object = engine.new_host_object(counter.clone(), Ownership::HostOwned);
    assert!(engine.host_object_of(&object).is_some());
    engine.global_object().set_property("counter", object.clone()).unwrap();

    drop(counter);
    assert!(engine.host_object_of(&object).is_none());
    assert_eq!(
        eval(&engine, "try { counter.count; 'read' } catch (e) { e.name }").to_string(),
        "TypeError"
    );
}

#[test]
fn test_script_owned_object_is_kept_alive_by_script() {
    let engine = create_test_engine();
    let counter = Counter::shared();
    let weak = Rc::downgrade(&counter);
    let object = engine.new_host_object(counter, Ownership::ScriptOwned);
    assert!(weak.upgrade().is_some());

    let shared = engine.host_object_of(&object).unwrap();
    assert_eq!(shared.borrow().class_name(), "Counter");
    drop(shared);

    drop(object);
    engine.collect_garbage();
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_finalized_bridges_release_their_functions() {
    let engine = create_test_engine();
    let baseline = engine.native_function_count();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    // count: getter + setter, label: getter, three methods, toString
    assert_eq!(engine.native_function_count(), baseline + 7);

    drop(object);
    engine.collect_garbage();
    eval(&engine, "0");
    assert_eq!(engine.native_function_count(), baseline);
}

#[test]
fn test_plain_objects_are_not_host_objects() {
    let engine = create_test_engine();
    let plain = engine.new_object();
    assert!(engine.host_object_of(&plain).is_none());
    assert!(engine.host_members(&plain).is_empty());
}

#[test]
fn test_bridges_finalized_mid_evaluation_are_released() {
    let engine = create_test_engine();
    let baseline = engine.native_function_count();
    let object = engine.new_host_object(Counter::shared(), Ownership::ScriptOwned);
    engine.global_object().set_property("counter", object).unwrap();
    assert_eq!(engine.native_function_count(), baseline + 7);

    // The last reference goes away while the script is running, so the
    // finalizer runs inside the evaluation.
    eval(&engine, "counter.add(1); counter = null; print('dropped');");
    assert_eq!(engine.native_function_count(), baseline);
}
