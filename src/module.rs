//! ES module support.
//!
//! Imports resolve in two steps. A specifier that names a module registered with
//! [`Engine::register_module`] is served from its export table; anything else is
//! read from disk relative to [`crate::EngineConfig::base_dir`] and compiled. The
//! runtime caches loaded modules, so each is resolved once per engine.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::path::{Path, PathBuf};

use rquickjs::qjs;

use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind};
use crate::ffi::{self, RawContext};
use crate::platform::ConsoleLevel;
use crate::prelude::FxHashMap;
use crate::value::Value;

/// Payload of one module export.
#[derive(Debug, Clone)]
pub enum ExportValue {
    Int(i32),
    Float(f64),
    String(String),
    Object(Value),
    Function(Value),
}

impl ExportValue {
    fn to_value(&self) -> Value {
        match self {
            ExportValue::Int(n) => Value::from(*n),
            ExportValue::Float(n) => Value::from(*n),
            ExportValue::String(s) => Value::from(s.as_str()),
            ExportValue::Object(v) | ExportValue::Function(v) => v.clone(),
        }
    }
}

/// Export table for a native module, built before registration.
///
/// ```ignore
/// engine.register_module(
///     ModuleBuilder::new("app")
///         .int("version", 3)
///         .string("name", "demo")
///         .function("greet", engine.new_function("greet", 1, greet)),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    name: String,
    exports: Vec<(String, ExportValue)>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn export(mut self, name: impl Into<String>, value: ExportValue) -> Self {
        self.exports.push((name.into(), value));
        self
    }

    pub fn int(self, name: impl Into<String>, value: i32) -> Self {
        self.export(name, ExportValue::Int(value))
    }

    pub fn float(self, name: impl Into<String>, value: f64) -> Self {
        self.export(name, ExportValue::Float(value))
    }

    pub fn string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.export(name, ExportValue::String(value.into()))
    }

    pub fn object(self, name: impl Into<String>, value: Value) -> Self {
        self.export(name, ExportValue::Object(value))
    }

    pub fn function(self, name: impl Into<String>, value: Value) -> Self {
        self.export(name, ExportValue::Function(value))
    }
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: FxHashMap<String, Vec<(String, ExportValue)>>,
}

impl ModuleRegistry {
    fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    fn exports(&self, name: &str) -> Option<Vec<(String, ExportValue)>> {
        self.modules.get(name).cloned()
    }

    pub(crate) fn take_all(&mut self) -> FxHashMap<String, Vec<(String, ExportValue)>> {
        std::mem::take(&mut self.modules)
    }
}

impl Engine {
    /// Make a native module importable by name. Names are unique per engine.
    pub fn register_module(&self, module: ModuleBuilder) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::HostState);
        }
        ffi::cstring(&module.name)?;
        for (export, _) in &module.exports {
            ffi::cstring(export)?;
        }
        let mut modules = self.modules.borrow_mut();
        if modules.contains(&module.name) {
            return Err(EngineError::DuplicateModule(module.name));
        }
        modules.modules.insert(module.name, module.exports);
        Ok(())
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.borrow().contains(name)
    }

    /// File a specifier resolves to: the exact path, then each configured
    /// extension appended.
    pub fn resolve_module_path(&self, specifier: &str) -> Result<PathBuf, EngineError> {
        let base = &self.config().base_dir;
        let candidate = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            base.join(specifier)
        };
        if candidate.is_file() {
            return Ok(candidate);
        }
        for ext in &self.config().module_extensions {
            let with_ext = PathBuf::from(format!("{}.{}", candidate.display(), ext));
            if with_ext.is_file() {
                return Ok(with_ext);
            }
        }
        Err(EngineError::ModuleNotFound {
            specifier: specifier.to_string(),
            base: base.clone(),
        })
    }

    unsafe fn native_module(&self, name: &str) -> *mut qjs::JSModuleDef {
        let ctx = self.ctx();
        let Some(exports) = self.modules.borrow().exports(name) else {
            return std::ptr::null_mut();
        };
        let Ok(cname) = ffi::cstring(name) else {
            return std::ptr::null_mut();
        };
        unsafe {
            let m = qjs::JS_NewCModule(ctx, cname.as_ptr(), Some(init_native_module));
            if m.is_null() {
                return m;
            }
            for (export, _) in &exports {
                let Ok(cexport) = ffi::cstring(export) else {
                    continue;
                };
                if qjs::JS_AddModuleExport(ctx, m, cexport.as_ptr()) < 0 {
                    return std::ptr::null_mut();
                }
            }
            m
        }
    }

    unsafe fn file_module(&self, name: &str) -> *mut qjs::JSModuleDef {
        let ctx = self.ctx();
        let source = self
            .resolve_module_path(name)
            .and_then(|path| Ok(std::fs::read_to_string(path)?));
        let source = match source {
            Ok(source) => source,
            Err(err) => {
                self.console()
                    .write(ConsoleLevel::Warn, &format!("module load failed: {}", err));
                let message = format!("could not load module '{}'", name);
                unsafe { ffi::throw_error(ctx, ErrorKind::ReferenceError, &message) };
                return std::ptr::null_mut();
            }
        };

        let (Ok(csource), Ok(cname)) = (std::ffi::CString::new(source.as_str()), ffi::cstring(name))
        else {
            let message = format!("module '{}' contains a NUL byte", name);
            unsafe { ffi::throw_error(ctx, ErrorKind::SyntaxError, &message) };
            return std::ptr::null_mut();
        };

        let script_id = self.record_script(name);
        if let Some(agent) = self.agent() {
            agent.script_load(script_id, &source, name, 1);
        }

        unsafe {
            let compiled = qjs::JS_Eval(
                ctx,
                csource.as_ptr(),
                csource.as_bytes().len() as qjs::size_t,
                cname.as_ptr(),
                (qjs::JS_EVAL_TYPE_MODULE | qjs::JS_EVAL_FLAG_COMPILE_ONLY) as c_int,
            );
            if ffi::is_exception(compiled) {
                return std::ptr::null_mut();
            }
            // The context's module list holds its own reference.
            let m = qjs::JS_VALUE_GET_PTR(compiled) as *mut qjs::JSModuleDef;
            qjs::JS_FreeValue(ctx, compiled);
            m
        }
    }
}

/// Loader hook installed on the runtime. Module names arrive normalized.
pub(crate) unsafe extern "C" fn module_loader(
    ctx: RawContext,
    module_name: *const c_char,
    _opaque: *mut c_void,
) -> *mut qjs::JSModuleDef {
    let Some(engine) = (unsafe { Engine::from_context(ctx) }) else {
        return std::ptr::null_mut();
    };
    if engine.is_closed() || module_name.is_null() {
        return std::ptr::null_mut();
    }
    let name = unsafe { CStr::from_ptr(module_name) }.to_string_lossy().into_owned();
    if engine.has_module(&name) {
        unsafe { engine.native_module(&name) }
    } else {
        unsafe { engine.file_module(&name) }
    }
}

unsafe extern "C" fn init_native_module(ctx: RawContext, m: *mut qjs::JSModuleDef) -> c_int {
    let Some(engine) = (unsafe { Engine::from_context(ctx) }) else {
        return -1;
    };
    let name = unsafe {
        let atom = qjs::JS_GetModuleName(ctx, m);
        let name = ffi::atom_to_string(ctx, atom);
        qjs::JS_FreeAtom(ctx, atom);
        name
    };
    let Some(exports) = engine.modules.borrow().exports(&name) else {
        return -1;
    };
    for (export, value) in exports {
        let Ok(cexport) = ffi::cstring(&export) else {
            return -1;
        };
        let raw = value.to_value().to_raw_owned(&engine);
        if unsafe { qjs::JS_SetModuleExport(ctx, m, cexport.as_ptr(), raw) } < 0 {
            return -1;
        }
    }
    0
}
