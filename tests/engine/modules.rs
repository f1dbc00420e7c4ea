//! ES module tests: native modules and file-backed imports

use std::fs;

use super::{create_engine_with, create_test_engine, eval, test_config};
use quickscript::{EngineError, ModuleBuilder, Value};

fn engine_in(dir: &tempfile::TempDir) -> quickscript::EngineHost {
    create_engine_with(test_config().with_base_dir(dir.path())).0
}

#[test]
fn test_native_module_exports() {
    let engine = create_test_engine();
    let greet = engine.new_function("greet", 1, |ctx| {
        Value::from(format!("hello {}", ctx.argument(0).to_string()))
    });
    let config = engine.new_object();
    config.set_property("debug", true).unwrap();
    engine
        .register_module(
            ModuleBuilder::new("app")
                .int("version", 3)
                .float("ratio", 0.5)
                .string("name", "demo")
                .object("config", config)
                .function("greet", greet),
        )
        .unwrap();
    assert!(engine.has_module("app"));

    let result = eval(
        &engine,
        "import { version, ratio, name, config, greet } from 'app';\n\
         globalThis.out = [version, ratio, name, config.debug, greet('you')].join('|');",
    );
    assert!(!result.is_error(), "{}", result.to_string());
    assert_eq!(eval(&engine, "out").to_string(), "3|0.5|demo|true|hello you");
}

#[test]
fn test_duplicate_module_is_rejected() {
    let engine = create_test_engine();
    engine.register_module(ModuleBuilder::new("dup")).unwrap();
    let err = engine.register_module(ModuleBuilder::new("dup").int("x", 1)).err();
    assert!(matches!(err, Some(EngineError::DuplicateModule(name)) if name == "dup"));
}

#[test]
fn test_module_names_must_be_valid() {
    let engine = create_test_engine();
    let err = engine.register_module(ModuleBuilder::new("bad\0")).err();
    assert!(matches!(err, Some(EngineError::InvalidName(_))));
    let err = engine
        .register_module(ModuleBuilder::new("ok").int("bad\0export", 1))
        .err();
    assert!(matches!(err, Some(EngineError::InvalidName(_))));
}

#[test]
fn test_file_module_import() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("math.js"), "export function square(x) { return x * x; }\n").unwrap();
    fs::write(
        dir.path().join("consts.mjs"),
        "import { square } from './math.js';\nexport const nine = square(3);\n",
    )
    .unwrap();

    let engine = engine_in(&dir);
    let result = eval(&engine, "import { nine } from 'consts';\nglobalThis.answer = nine;");
    assert!(!result.is_error(), "{}", result.to_string());
    assert_eq!(eval(&engine, "answer").to_number(), 9.0);
}

#[test]
fn test_resolve_module_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("exact.js"), "").unwrap();
    fs::write(dir.path().join("noext.mjs"), "").unwrap();
    let engine = engine_in(&dir);

    assert_eq!(engine.resolve_module_path("exact.js").unwrap(), dir.path().join("exact.js"));
    assert_eq!(engine.resolve_module_path("noext").unwrap(), dir.path().join("noext.mjs"));
    assert!(matches!(
        engine.resolve_module_path("missing"),
        Err(EngineError::ModuleNotFound { .. })
    ));
}

#[test]
fn test_missing_module_raises_reference_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let result = eval(&engine, "import { x } from 'nowhere';\nx;");
    assert!(result.is_error());
    let message = result.to_string();
    assert!(message.contains("ReferenceError"), "{}", message);
    assert!(message.contains("nowhere"), "{}", message);
    engine.clear_exceptions();
}

#[test]
fn test_module_top_level_throw_is_an_error_value() {
    let engine = create_test_engine();
    let result = eval(&engine, "export const a = 1;\nthrow new Error('module failed');");
    assert!(result.is_error());
    assert!(result.to_string().contains("module failed"));
    engine.clear_exceptions();
}

#[test]
fn test_modules_load_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("counter.js"),
        "globalThis.loads = (globalThis.loads || 0) + 1;\nexport const n = 1;\n",
    )
    .unwrap();
    let engine = engine_in(&dir);
    eval(&engine, "import { n } from 'counter.js';");
    eval(&engine, "import { n } from 'counter.js';");
    assert_eq!(eval(&engine, "loads").to_number(), 1.0);
}

#[test]
fn test_plain_scripts_are_not_modules() {
    let engine = create_test_engine();
    // A module would return undefined and keep `v` out of the global scope.
    assert_eq!(eval(&engine, "var v = 'global'; v").to_string(), "global");
    assert_eq!(eval(&engine, "v").to_string(), "global");
}
