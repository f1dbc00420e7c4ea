//! Native function dispatch.
//!
//! Every native function exposed to scripts is one runtime function object bound
//! to [`native_trampoline`] with a dispatch index as its "magic" value. The
//! trampoline resolves the index through the engine's [`Registry`] to the real
//! callback and its closure data, wraps the call in an [`ExecutionContext`] and
//! converts the result back.

use std::any::Any;
use std::cell::Cell;
use std::ffi::c_int;
use std::rc::Rc;

use rquickjs::qjs;

use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind};
use crate::ffi::{self, RawContext, RawValue};
use crate::prelude::FxHashMap;
use crate::value::Value;

/// Index the runtime passes back to the trampoline. Allocated monotonically and
/// never reused within an engine.
pub type DispatchIndex = u32;

/// Typed native callback: `(context, engine, closure data) -> result`.
pub type NativeFn<T> = fn(&mut ExecutionContext<'_>, &Engine, &T) -> Value;

pub(crate) type ErasedCallback = Box<dyn Fn(&mut ExecutionContext<'_>, &Engine, &dyn Any) -> Option<Value>>;

/// How the runtime may invoke a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConvention {
    /// Ordinary function; `new` on it throws
    #[default]
    Plain,
    /// Only callable with `new`
    ConstructorOnly,
    /// Callable both ways; the callback checks
    /// [`ExecutionContext::is_called_as_constructor`]
    ConstructorOrPlain,
}

impl CallConvention {
    fn cproto(self) -> qjs::JSCFunctionEnum {
        match self {
            CallConvention::Plain => qjs::JSCFunctionEnum_JS_CFUNC_generic_magic,
            CallConvention::ConstructorOnly => qjs::JSCFunctionEnum_JS_CFUNC_constructor_magic,
            CallConvention::ConstructorOrPlain => {
                qjs::JSCFunctionEnum_JS_CFUNC_constructor_or_func_magic
            }
        }
    }

    fn is_constructor(self) -> bool {
        self != CallConvention::Plain
    }
}

/// Result of a registration: the dispatch index and the function object.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub index: DispatchIndex,
    pub function: Value,
}

pub(crate) struct NativeFunctionEntry {
    pub(crate) index: DispatchIndex,
    pub(crate) name: String,
    pub(crate) convention: CallConvention,
    callback: ErasedCallback,
    data: Box<dyn Any>,
    /// Owned reference to the function object, `undefined` once released
    reflects_into: Cell<RawValue>,
}

impl NativeFunctionEntry {
    fn invoke(&self, ctx: &mut ExecutionContext<'_>, engine: &Engine) -> Option<Value> {
        (self.callback)(ctx, engine, self.data.as_ref())
    }

    pub(crate) fn function_identity(&self) -> Option<usize> {
        ffi::heap_ptr(self.reflects_into.get())
    }

    /// Give up the owned function reference. The caller frees it.
    pub(crate) fn take_function(&self) -> RawValue {
        self.reflects_into.replace(qjs::JS_UNDEFINED)
    }
}

/// Dispatch table owned by one engine.
#[derive(Default)]
pub(crate) struct Registry {
    entries: FxHashMap<DispatchIndex, Rc<NativeFunctionEntry>>,
    next_index: DispatchIndex,
}

impl Registry {
    fn allocate(&mut self) -> Result<DispatchIndex, EngineError> {
        let index = self.next_index;
        if index > i32::MAX as u32 {
            return Err(EngineError::registration("dispatch index space exhausted"));
        }
        self.next_index += 1;
        Ok(index)
    }

    pub(crate) fn get(&self, index: DispatchIndex) -> Option<Rc<NativeFunctionEntry>> {
        self.entries.get(&index).cloned()
    }

    pub(crate) fn remove(&mut self, index: DispatchIndex) -> Option<Rc<NativeFunctionEntry>> {
        self.entries.remove(&index)
    }

    pub(crate) fn take_all(&mut self) -> Vec<Rc<NativeFunctionEntry>> {
        let mut entries: Vec<_> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.index);
        entries
    }

    fn index_of(&self, identity: usize) -> Option<DispatchIndex> {
        self.entries
            .values()
            .find(|e| e.function_identity() == Some(identity))
            .map(|e| e.index)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Registration
// ============================================================================

impl Engine {
    /// Register a typed native callback with its closure data.
    ///
    /// The data is stored type-erased and checked at every dispatch; a mismatch
    /// raises a `TypeError` instead of invoking the callback.
    pub fn register_native<T: 'static>(
        &self,
        name: &str,
        arity: u32,
        convention: CallConvention,
        callback: NativeFn<T>,
        data: T,
    ) -> Result<NativeFunction, EngineError> {
        let erased: ErasedCallback = Box::new(move |ctx, engine, data: &dyn Any| {
            data.downcast_ref::<T>().map(|data| callback(ctx, engine, data))
        });
        self.register_entry(name, arity, convention, erased, Box::new(data))
    }

    /// Create a plain script function backed by a Rust closure. Returns an
    /// invalid value if the engine is shut down.
    pub fn new_function<F>(&self, name: &str, arity: u32, f: F) -> Value
    where
        F: Fn(&mut ExecutionContext<'_>) -> Value + 'static,
    {
        let erased: ErasedCallback = Box::new(move |ctx, _engine, _data| Some(f(ctx)));
        match self.register_entry(name, arity, CallConvention::Plain, erased, Box::new(())) {
            Ok(native) => native.function,
            Err(_) => Value::invalid(),
        }
    }

    pub(crate) fn register_entry(
        &self,
        name: &str,
        arity: u32,
        convention: CallConvention,
        callback: ErasedCallback,
        data: Box<dyn Any>,
    ) -> Result<NativeFunction, EngineError> {
        self.drain_bridge_releases();
        if self.is_closed() {
            return Err(EngineError::HostState);
        }
        let cname = ffi::cstring(name)?;
        let index = self.registry.borrow_mut().allocate()?;
        let ctx = self.ctx();

        // The runtime stores every C function as the plain signature and calls
        // it with the magic argument appended for the *_magic prototypes.
        let func: qjs::JSCFunction = Some(unsafe {
            std::mem::transmute::<
                unsafe extern "C" fn(RawContext, RawValue, c_int, *mut RawValue, c_int) -> RawValue,
                unsafe extern "C" fn(RawContext, RawValue, c_int, *mut RawValue) -> RawValue,
            >(native_trampoline)
        });
        let raw = unsafe {
            qjs::JS_NewCFunction2(
                ctx,
                func,
                cname.as_ptr(),
                arity.min(i32::MAX as u32) as c_int,
                convention.cproto(),
                index as c_int,
            )
        };
        if ffi::is_exception(raw) {
            return Err(EngineError::registration(self.take_script_error().to_string()));
        }
        if convention.is_constructor() {
            unsafe {
                let proto = qjs::JS_NewObject(ctx);
                if ffi::is_exception(proto) {
                    qjs::JS_FreeValue(ctx, raw);
                    return Err(EngineError::registration(self.take_script_error().to_string()));
                }
                qjs::JS_SetConstructor(ctx, raw, proto);
                qjs::JS_FreeValue(ctx, proto);
            }
        }

        let function = self.adopt(raw);
        let entry = NativeFunctionEntry {
            index,
            name: name.to_string(),
            convention,
            callback,
            data,
            reflects_into: Cell::new(unsafe { qjs::JS_DupValue(ctx, raw) }),
        };
        self.registry.borrow_mut().entries.insert(index, Rc::new(entry));
        Ok(NativeFunction { index, function })
    }

    /// Drop a registration. Later calls through the function object raise a
    /// `ReferenceError`; the index is never handed out again.
    pub fn release_native(&self, index: DispatchIndex) -> bool {
        let entry = self.registry.borrow_mut().remove(index);
        match entry {
            Some(entry) => {
                let raw = entry.take_function();
                unsafe { qjs::JS_FreeValue(self.ctx(), raw) };
                // Dropped outside the registry borrow; the closure may own values.
                drop(entry);
                true
            }
            None => false,
        }
    }

    /// Dispatch index behind a function object created by this engine.
    pub fn dispatch_index_of(&self, function: &Value) -> Option<DispatchIndex> {
        let identity = function.identity()?;
        self.registry.borrow().index_of(identity)
    }

    pub fn native_function_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Release registrations whose host-object wrappers have been finalized.
    pub(crate) fn drain_bridge_releases(&self) {
        let pending = self.bridge_releases.take();
        for index in pending {
            self.release_native(index);
        }
    }
}

// ============================================================================
// Trampoline
// ============================================================================

/// Single entry point for every registered native function.
///
/// # Safety
/// Only called by the runtime with a context whose opaque pointer is the owning
/// [`Engine`] (set in `Engine::create`).
pub(crate) unsafe extern "C" fn native_trampoline(
    ctx: RawContext,
    this_val: RawValue,
    argc: c_int,
    argv: *mut RawValue,
    magic: c_int,
) -> RawValue {
    let Some(engine) = (unsafe { Engine::from_context(ctx) }) else {
        return unsafe { ffi::throw_error(ctx, ErrorKind::InternalError, "engine is not available") };
    };
    unsafe { dispatch(&engine, this_val, argc, argv, magic) }
}

unsafe fn dispatch(
    engine: &Rc<Engine>,
    this_val: RawValue,
    argc: c_int,
    argv: *mut RawValue,
    magic: c_int,
) -> RawValue {
    let ctx = engine.ctx();
    if engine.interrupt_requested() {
        return unsafe { ffi::throw_interrupted(ctx) };
    }
    // Anything pending on entry was left behind by host code, not raised by
    // this call.
    if unsafe { qjs::JS_HasException(ctx) } {
        unsafe { ffi::discard_exception(ctx) };
    }
    if engine.is_closed() {
        return unsafe { ffi::throw_error(ctx, ErrorKind::InternalError, "engine has been shut down") };
    }

    let index = magic as DispatchIndex;
    let entry = engine.registry.borrow().get(index);
    let Some(entry) = entry else {
        let message = format!("native function #{} has been released", index);
        return unsafe { ffi::throw_error(ctx, ErrorKind::ReferenceError, &message) };
    };

    let constructing = entry.convention.is_constructor() && ffi::is_object(this_val);
    let this_value = if constructing {
        let raw = unsafe { new_instance(ctx, this_val) };
        if ffi::is_exception(raw) {
            return raw;
        }
        engine.adopt(raw)
    } else {
        unsafe { Value::from_raw(engine, this_val) }
    };

    let arguments: Vec<Value> = (0..argc.max(0) as usize)
        .map(|i| unsafe { Value::from_raw(engine, *argv.add(i)) })
        .collect();
    let callee = unsafe { Value::from_raw(engine, entry.reflects_into.get()) };

    let agent = engine.agent();
    let script_id = match &agent {
        Some(agent) if agent.wants_positions() => {
            let position = unsafe { ffi::current_position(ctx) };
            match position {
                Some(position) => {
                    let id = engine.script_id_for(&position.file);
                    agent.position_change(id, position.line, position.column);
                    id
                }
                None => -1,
            }
        }
        _ => -1,
    };
    if let Some(agent) = &agent {
        agent.context_push();
        agent.function_entry(script_id);
    }

    let mut context = ExecutionContext::new(engine, this_value.clone(), arguments, callee, constructing);
    let result = entry.invoke(&mut context, engine);
    drop(context);

    let result = match result {
        Some(result) => result,
        None => {
            unsafe {
                ffi::throw_error(
                    ctx,
                    ErrorKind::TypeError,
                    &format!("{}: closure data has an unexpected type", entry.name),
                )
            };
            engine.exception_marker()
        }
    };

    if let Some(agent) = &agent {
        agent.function_exit(script_id, &result);
        agent.context_pop();
    }

    if result.is_cancelled() {
        return unsafe { ffi::throw_interrupted(ctx) };
    }
    if result.is_error() {
        if !unsafe { qjs::JS_HasException(ctx) } {
            let message = format!("{} returned an exception without raising one", entry.name);
            return unsafe { ffi::throw_error(ctx, ErrorKind::InternalError, &message) };
        }
        return qjs::JS_EXCEPTION;
    }
    if unsafe { qjs::JS_HasException(ctx) } {
        return qjs::JS_EXCEPTION;
    }
    if !result.is_valid() || result.is_undefined() {
        return if constructing {
            this_value.to_raw_owned(engine)
        } else {
            qjs::JS_UNDEFINED
        };
    }
    result.to_raw_owned(engine)
}

/// Fresh instance for a constructor call, inheriting from `new_target.prototype`.
unsafe fn new_instance(ctx: RawContext, new_target: RawValue) -> RawValue {
    unsafe {
        let proto = ffi::get_property_str(ctx, new_target, c"prototype");
        if ffi::is_exception(proto) {
            return proto;
        }
        let obj = if ffi::is_object(proto) {
            qjs::JS_NewObjectProto(ctx, proto)
        } else {
            qjs::JS_NewObject(ctx)
        };
        qjs::JS_FreeValue(ctx, proto);
        obj
    }
}
