//! Thin helpers over the raw QuickJS C API.
//!
//! Everything in here is `unsafe` plumbing: string marshalling, atoms, exception
//! slot handling and tag inspection. Ownership rules follow QuickJS: functions
//! named `take_*`/`new_*` return an owned reference the caller must free, `peek_*`
//! leave the runtime exactly as they found it.

pub(crate) mod backtrace;

use std::ffi::{CStr, CString, c_char};

use rquickjs::qjs;

use crate::error::{EngineError, ErrorKind};

pub(crate) type RawValue = qjs::JSValue;
pub(crate) type RawContext = *mut qjs::JSContext;

// ============================================================================
// Tags
// ============================================================================

pub(crate) fn tag(value: RawValue) -> i32 {
    unsafe { qjs::JS_VALUE_GET_TAG(value) }
}

pub(crate) fn is_exception(value: RawValue) -> bool {
    tag(value) == qjs::JS_TAG_EXCEPTION
}

pub(crate) fn is_object(value: RawValue) -> bool {
    tag(value) == qjs::JS_TAG_OBJECT
}

pub(crate) fn has_ref_count(value: RawValue) -> bool {
    unsafe { qjs::JS_VALUE_HAS_REF_COUNT(value) }
}

/// Identity of a heap value, used to detect cycles and compare handles.
pub(crate) fn heap_ptr(value: RawValue) -> Option<usize> {
    if has_ref_count(value) {
        Some(unsafe { qjs::JS_VALUE_GET_PTR(value) } as usize)
    } else {
        None
    }
}

/// Current refcount of a heap value. Every refcounted QuickJS value starts with
/// a `JSRefCountHeader { int ref_count; }`.
pub(crate) fn ref_count(value: RawValue) -> Option<i32> {
    if !has_ref_count(value) {
        return None;
    }
    let ptr = unsafe { qjs::JS_VALUE_GET_PTR(value) } as *const i32;
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { ptr.read() })
    }
}

pub(crate) fn new_bool(value: bool) -> RawValue {
    if value { qjs::JS_TRUE } else { qjs::JS_FALSE }
}

// ============================================================================
// Strings
// ============================================================================

pub(crate) fn cstring(name: &str) -> Result<CString, EngineError> {
    CString::new(name).map_err(|_| EngineError::invalid_name(name))
}

/// Create an owned string value. Never fails for valid UTF-8 except on OOM,
/// in which case the exception marker is returned.
pub(crate) unsafe fn new_string(ctx: RawContext, text: &str) -> RawValue {
    unsafe { qjs::JS_NewStringLen(ctx, text.as_ptr() as *const c_char, text.len() as _) }
}

/// Convert any value to a Rust string using the runtime's `ToString`.
///
/// Returns `None` if the conversion threw; the thrown exception is discarded so
/// the exception slot is left as it was.
pub(crate) unsafe fn to_rust_string(ctx: RawContext, value: RawValue) -> Option<String> {
    unsafe {
        if tag(value) == qjs::JS_TAG_SYMBOL {
            return Some(symbol_to_string(ctx, value));
        }
        let mut len: qjs::size_t = 0;
        let ptr = qjs::JS_ToCStringLen2(ctx, &mut len, value, false);
        if ptr.is_null() {
            discard_exception(ctx);
            return None;
        }
        let bytes = std::slice::from_raw_parts(ptr as *const u8, len as usize);
        let text = String::from_utf8_lossy(bytes).into_owned();
        qjs::JS_FreeCString(ctx, ptr);
        Some(text)
    }
}

unsafe fn symbol_to_string(ctx: RawContext, value: RawValue) -> String {
    unsafe {
        let desc = get_property_str(ctx, value, c"description");
        let text = if tag(desc) == qjs::JS_TAG_STRING {
            to_rust_string(ctx, desc).unwrap_or_default()
        } else {
            String::new()
        };
        qjs::JS_FreeValue(ctx, desc);
        format!("Symbol({})", text)
    }
}

pub(crate) unsafe fn get_property_str(ctx: RawContext, obj: RawValue, name: &CStr) -> RawValue {
    unsafe { qjs::JS_GetPropertyStr(ctx, obj, name.as_ptr()) }
}

// ============================================================================
// Atoms
// ============================================================================

/// Owned atom, freed on drop.
pub(crate) struct Atom {
    ctx: RawContext,
    pub(crate) raw: qjs::JSAtom,
}

impl Atom {
    pub(crate) unsafe fn new(ctx: RawContext, name: &str) -> Option<Self> {
        let raw = unsafe { qjs::JS_NewAtomLen(ctx, name.as_ptr() as *const c_char, name.len() as _) };
        if raw == qjs::JS_ATOM_NULL {
            None
        } else {
            Some(Self { ctx, raw })
        }
    }

    pub(crate) unsafe fn from_index(ctx: RawContext, index: u32) -> Option<Self> {
        Self::new(ctx, &index.to_string())
    }
}

impl Drop for Atom {
    fn drop(&mut self) {
        unsafe { qjs::JS_FreeAtom(self.ctx, self.raw) }
    }
}

pub(crate) unsafe fn atom_to_string(ctx: RawContext, atom: qjs::JSAtom) -> String {
    unsafe {
        let value = qjs::JS_AtomToValue(ctx, atom);
        let text = to_rust_string(ctx, value).unwrap_or_default();
        qjs::JS_FreeValue(ctx, value);
        text
    }
}

// ============================================================================
// Exception slot
// ============================================================================

/// Take the pending exception (owned). Returns `None` when nothing is pending.
pub(crate) unsafe fn take_exception(ctx: RawContext) -> Option<RawValue> {
    unsafe {
        if !qjs::JS_HasException(ctx) {
            return None;
        }
        Some(qjs::JS_GetException(ctx))
    }
}

/// Drop whatever exception is pending.
pub(crate) unsafe fn discard_exception(ctx: RawContext) {
    unsafe {
        if let Some(exc) = take_exception(ctx) {
            qjs::JS_FreeValue(ctx, exc);
        }
    }
}

/// Run `f` against the pending exception and put it back afterwards.
///
/// Anything `f` throws is discarded before the original exception is restored,
/// so callers observe the same exception slot before and after.
pub(crate) unsafe fn peek_exception<R>(ctx: RawContext, f: impl FnOnce(RawValue) -> R) -> Option<R> {
    unsafe {
        let exc = take_exception(ctx)?;
        let result = f(exc);
        discard_exception(ctx);
        qjs::JS_Throw(ctx, exc);
        Some(result)
    }
}

/// Raise a new error of `kind` and return the exception marker.
pub(crate) unsafe fn throw_error(ctx: RawContext, kind: ErrorKind, message: &str) -> RawValue {
    unsafe {
        let msg = new_string(ctx, message);
        if is_exception(msg) {
            return qjs::JS_EXCEPTION;
        }
        let global = qjs::JS_GetGlobalObject(ctx);
        let ctor_name = cstring(kind.constructor_name()).unwrap_or_default();
        let ctor = qjs::JS_GetPropertyStr(ctx, global, ctor_name.as_ptr());
        qjs::JS_FreeValue(ctx, global);
        discard_exception_if(ctx, ctor);

        let mut args = [msg];
        let error = if qjs::JS_IsConstructor(ctx, ctor) {
            qjs::JS_CallConstructor(ctx, ctor, 1, args.as_mut_ptr())
        } else {
            // Constructor removed or shadowed by the script; fall back to a plain Error.
            let obj = qjs::JS_NewError(ctx);
            if !is_exception(obj) {
                qjs::JS_DefinePropertyValueStr(
                    ctx,
                    obj,
                    c"message".as_ptr(),
                    qjs::JS_DupValue(ctx, msg),
                    (qjs::JS_PROP_WRITABLE | qjs::JS_PROP_CONFIGURABLE) as i32,
                );
            }
            obj
        };
        qjs::JS_FreeValue(ctx, ctor);
        qjs::JS_FreeValue(ctx, msg);

        if is_exception(error) {
            return qjs::JS_EXCEPTION;
        }
        qjs::JS_Throw(ctx, error)
    }
}

/// Raise the uncatchable "interrupted" error the runtime uses for its own
/// interrupt handler, so script `catch` blocks cannot swallow a cancellation.
pub(crate) unsafe fn throw_interrupted(ctx: RawContext) -> RawValue {
    unsafe {
        throw_error(ctx, ErrorKind::InternalError, "interrupted");
        if let Some(exc) = take_exception(ctx) {
            qjs::JS_SetUncatchableError(ctx, exc);
            qjs::JS_Throw(ctx, exc);
        }
        qjs::JS_EXCEPTION
    }
}

/// Message text of an exception object: `Name: message` for errors, `ToString`
/// of anything else that was thrown.
pub(crate) unsafe fn exception_message(ctx: RawContext, exc: RawValue) -> String {
    unsafe { to_rust_string(ctx, exc).unwrap_or_else(|| "<unprintable exception>".to_string()) }
}

/// The `stack` property of an exception object, if it has a string one.
pub(crate) unsafe fn exception_stack(ctx: RawContext, exc: RawValue) -> Option<String> {
    unsafe {
        if !is_object(exc) {
            return None;
        }
        let stack = get_property_str(ctx, exc, c"stack");
        discard_exception_if(ctx, stack);
        let text = if tag(stack) == qjs::JS_TAG_STRING {
            to_rust_string(ctx, stack)
        } else {
            None
        };
        qjs::JS_FreeValue(ctx, stack);
        text
    }
}

unsafe fn discard_exception_if(ctx: RawContext, value: RawValue) {
    if is_exception(value) {
        unsafe { discard_exception(ctx) }
    }
}

/// Backtrace of the current call stack, captured without throwing.
pub(crate) unsafe fn capture_stack(ctx: RawContext) -> Option<String> {
    unsafe {
        let err = qjs::JS_NewError(ctx);
        if is_exception(err) {
            discard_exception(ctx);
            return None;
        }
        let stack = exception_stack(ctx, err);
        qjs::JS_FreeValue(ctx, err);
        stack
    }
}

/// Position of the innermost script frame on the current call stack.
pub(crate) unsafe fn current_position(ctx: RawContext) -> Option<backtrace::Position> {
    let stack = unsafe { capture_stack(ctx) }?;
    backtrace::innermost_script_position(&stack)
}
