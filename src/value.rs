//! Value handles.
//!
//! A [`Value`] is either a plain native [`Variant`] that never touches the script
//! heap, or a handle to a heap value owned by one [`Engine`]. Foreign handles follow
//! the runtime's reference counting exactly: cloning duplicates the reference and
//! dropping releases it.

use std::fmt;
use std::rc::Rc;

use rquickjs::qjs;

use crate::engine::{Engine, error_location};
use crate::error::EngineError;
use crate::ffi::{self, Atom, RawValue};

/// Nesting limit for [`Value::to_variant`].
pub const VARIANT_DEPTH_LIMIT: usize = 8;

/// A native value that lives entirely on the host side.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    String(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::String(s) => f.write_str(s),
            Variant::Number(n) => f.write_str(&format_number(*n)),
            Variant::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Format a number the way script `String(n)` does for the common cases.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Flags for [`Value::set_property_with_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags(0);
    pub const READ_ONLY: PropertyFlags = PropertyFlags(0x01);
    pub const UNDELETABLE: PropertyFlags = PropertyFlags(0x02);
    pub const SKIP_IN_ENUMERATION: PropertyFlags = PropertyFlags(0x04);
    /// The value is a function installed as the property's getter
    pub const PROPERTY_GETTER: PropertyFlags = PropertyFlags(0x08);
    /// The value is a function installed as the property's setter
    pub const PROPERTY_SETTER: PropertyFlags = PropertyFlags(0x10);
    /// Plain assignment: keep whatever attributes the property already has
    pub const KEEP_EXISTING_FLAGS: PropertyFlags = PropertyFlags(0x800);

    pub fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Runtime `JS_PROP_*` bits for a data or accessor definition.
    pub(crate) fn to_runtime_flags(self) -> i32 {
        let mut flags = qjs::JS_PROP_HAS_CONFIGURABLE | qjs::JS_PROP_HAS_ENUMERABLE;
        if !self.contains(PropertyFlags::UNDELETABLE) {
            flags |= qjs::JS_PROP_CONFIGURABLE;
        }
        if !self.contains(PropertyFlags::SKIP_IN_ENUMERATION) {
            flags |= qjs::JS_PROP_ENUMERABLE;
        }
        if self.contains(PropertyFlags::PROPERTY_GETTER) {
            flags |= qjs::JS_PROP_HAS_GET;
        }
        if self.contains(PropertyFlags::PROPERTY_SETTER) {
            flags |= qjs::JS_PROP_HAS_SET;
        }
        if !self.contains(PropertyFlags::PROPERTY_GETTER)
            && !self.contains(PropertyFlags::PROPERTY_SETTER)
        {
            flags |= qjs::JS_PROP_HAS_VALUE | qjs::JS_PROP_HAS_WRITABLE;
            if !self.contains(PropertyFlags::READ_ONLY) {
                flags |= qjs::JS_PROP_WRITABLE;
            }
        }
        (flags | qjs::JS_PROP_THROW) as i32
    }
}

impl std::ops::BitOr for PropertyFlags {
    type Output = PropertyFlags;

    fn bitor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 | rhs.0)
    }
}

/// Owned reference into an engine's heap.
pub(crate) struct ForeignHandle {
    engine: Rc<Engine>,
    raw: RawValue,
}

impl ForeignHandle {
    /// Take ownership of `raw` without duplicating it.
    fn adopt(engine: Rc<Engine>, raw: RawValue) -> Self {
        engine.handle_created();
        Self { engine, raw }
    }
}

impl Clone for ForeignHandle {
    fn clone(&self) -> Self {
        let raw = unsafe { qjs::JS_DupValue(self.engine.ctx(), self.raw) };
        Self::adopt(self.engine.clone(), raw)
    }
}

impl Drop for ForeignHandle {
    fn drop(&mut self) {
        if ffi::has_ref_count(self.raw) {
            unsafe { qjs::JS_FreeValue(self.engine.ctx(), self.raw) };
        }
        self.engine.handle_dropped();
    }
}

#[derive(Clone)]
enum Repr {
    Invalid,
    Cancelled,
    Native(Variant),
    Foreign(ForeignHandle),
}

/// A script value held by the host.
///
/// Exceptions are values too: `evaluate` and native callbacks hand back an
/// exception-flagged `Value` ([`Value::is_error`]) while the exception itself stays
/// pending in the runtime.
#[derive(Clone)]
pub struct Value {
    repr: Repr,
}

impl Default for Value {
    fn default() -> Self {
        Value::invalid()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Invalid => f.write_str("Value::Invalid"),
            Repr::Cancelled => f.write_str("Value::Cancelled"),
            Repr::Native(v) => write!(f, "Value::Native({:?})", v),
            Repr::Foreign(h) if ffi::is_exception(h.raw) => f.write_str("Value::Exception"),
            Repr::Foreign(h) => write!(f, "Value::Foreign(tag {})", ffi::tag(h.raw)),
        }
    }
}

impl From<Variant> for Value {
    fn from(v: Variant) -> Self {
        Value {
            repr: Repr::Native(v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Variant::String(s.to_string()).into()
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Variant::String(s).into()
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Variant::Number(n).into()
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Variant::Number(n as f64).into()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Variant::Bool(b).into()
    }
}

impl Value {
    /// An empty handle bound to no engine.
    pub fn invalid() -> Self {
        Value {
            repr: Repr::Invalid,
        }
    }

    pub(crate) fn cancelled() -> Self {
        Value {
            repr: Repr::Cancelled,
        }
    }

    /// Wrap a raw runtime value, duplicating the reference. The caller keeps its
    /// own reference.
    ///
    /// # Safety
    /// `raw` must be a live value belonging to `engine`'s runtime.
    pub unsafe fn from_raw(engine: &Engine, raw: qjs::JSValue) -> Self {
        let dup = unsafe { qjs::JS_DupValue(engine.ctx(), raw) };
        engine.adopt(dup)
    }

    /// Take ownership of a raw reference. Used for values freshly returned by the
    /// runtime, which the caller would otherwise have to free.
    pub(crate) fn adopt(engine: Rc<Engine>, raw: RawValue) -> Self {
        Value {
            repr: Repr::Foreign(ForeignHandle::adopt(engine, raw)),
        }
    }

    /// Borrowed raw value; no ownership is transferred.
    pub(crate) fn raw(&self) -> Option<RawValue> {
        match &self.repr {
            Repr::Foreign(h) => Some(h.raw),
            _ => None,
        }
    }

    fn foreign(&self) -> Option<&ForeignHandle> {
        match &self.repr {
            Repr::Foreign(h) => Some(h),
            _ => None,
        }
    }

    /// Live engine and raw value, or `None` for native values and handles whose
    /// engine has been shut down.
    fn live(&self) -> Option<(&Engine, RawValue)> {
        let h = self.foreign()?;
        if h.engine.is_closed() {
            return None;
        }
        Some((&h.engine, h.raw))
    }

    /// The engine this handle belongs to.
    pub fn engine(&self) -> Option<Rc<Engine>> {
        self.foreign().map(|h| h.engine.clone())
    }

    /// Owned raw value suitable for handing to `engine`'s runtime.
    ///
    /// Native variants are materialized, foreign handles are duplicated and the
    /// exception marker is replaced by a duplicate of the pending exception.
    /// Values from another engine become `undefined`.
    pub(crate) fn to_raw_owned(&self, engine: &Engine) -> RawValue {
        let ctx = engine.ctx();
        match &self.repr {
            Repr::Invalid | Repr::Cancelled => qjs::JS_UNDEFINED,
            Repr::Native(Variant::String(s)) => unsafe { ffi::new_string(ctx, s) },
            Repr::Native(Variant::Number(n)) => qjs::JS_NewFloat64(*n),
            Repr::Native(Variant::Bool(b)) => ffi::new_bool(*b),
            Repr::Foreign(h) => {
                if !std::ptr::eq(Rc::as_ptr(&h.engine), engine) {
                    return qjs::JS_UNDEFINED;
                }
                if ffi::is_exception(h.raw) {
                    unsafe {
                        ffi::peek_exception(ctx, |exc| qjs::JS_DupValue(ctx, exc))
                            .unwrap_or(qjs::JS_UNDEFINED)
                    }
                } else {
                    unsafe { qjs::JS_DupValue(ctx, h.raw) }
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Type predicates
    // ═══════════════════════════════════════════════════════════════════════════

    /// False for the empty handle, for cancelled evaluations and for handles
    /// whose engine has been shut down.
    pub fn is_valid(&self) -> bool {
        match &self.repr {
            Repr::Native(_) => true,
            Repr::Foreign(h) => !h.engine.is_closed(),
            Repr::Invalid | Repr::Cancelled => false,
        }
    }

    /// The evaluation that produced this value was aborted through the interrupt
    /// flag. Cancellation is not an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.repr, Repr::Cancelled)
    }

    /// This value marks a pending script exception.
    pub fn is_error(&self) -> bool {
        self.raw().is_some_and(ffi::is_exception)
    }

    pub fn is_native(&self) -> bool {
        matches!(self.repr, Repr::Native(_))
    }

    fn tag_is(&self, tag: i32) -> bool {
        self.raw().is_some_and(|raw| ffi::tag(raw) == tag)
    }

    pub fn is_undefined(&self) -> bool {
        self.tag_is(qjs::JS_TAG_UNDEFINED)
    }

    pub fn is_null(&self) -> bool {
        self.tag_is(qjs::JS_TAG_NULL)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.repr, Repr::Native(Variant::Bool(_))) || self.tag_is(qjs::JS_TAG_BOOL)
    }

    pub fn is_number(&self) -> bool {
        matches!(self.repr, Repr::Native(Variant::Number(_)))
            || self.raw().is_some_and(|raw| unsafe { qjs::JS_IsNumber(raw) })
    }

    pub fn is_string(&self) -> bool {
        matches!(self.repr, Repr::Native(Variant::String(_))) || self.tag_is(qjs::JS_TAG_STRING)
    }

    pub fn is_symbol(&self) -> bool {
        self.tag_is(qjs::JS_TAG_SYMBOL)
    }

    pub fn is_object(&self) -> bool {
        self.tag_is(qjs::JS_TAG_OBJECT)
    }

    pub fn is_array(&self) -> bool {
        self.live()
            .is_some_and(|(engine, raw)| unsafe { qjs::JS_IsArray(engine.ctx(), raw) } == 1)
    }

    pub fn is_function(&self) -> bool {
        self.live()
            .is_some_and(|(engine, raw)| unsafe { qjs::JS_IsFunction(engine.ctx(), raw) })
    }

    /// An `Error` instance (not the exception marker; see [`Value::is_error`]).
    pub fn is_error_object(&self) -> bool {
        self.live()
            .is_some_and(|(engine, raw)| unsafe { qjs::JS_IsError(engine.ctx(), raw) })
    }

    pub fn is_date(&self) -> bool {
        self.raw().is_some_and(|raw| unsafe { qjs::JS_IsDate(raw) })
    }

    pub fn is_promise(&self) -> bool {
        self.raw().is_some_and(|raw| unsafe { qjs::JS_IsPromise(raw) })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Conversions
    // ═══════════════════════════════════════════════════════════════════════════

    /// String form of the value.
    ///
    /// For an exception marker this reads the pending exception and puts it back,
    /// so the engine still reports it as uncaught afterwards.
    pub fn to_string(&self) -> String {
        match &self.repr {
            Repr::Invalid | Repr::Cancelled => String::new(),
            Repr::Native(v) => v.to_string(),
            Repr::Foreign(_) => {
                let Some((engine, raw)) = self.live() else {
                    return String::new();
                };
                let ctx = engine.ctx();
                if ffi::is_exception(raw) {
                    unsafe { ffi::peek_exception(ctx, |exc| ffi::exception_message(ctx, exc)) }
                        .unwrap_or_default()
                } else {
                    unsafe { ffi::to_rust_string(ctx, raw) }.unwrap_or_default()
                }
            }
        }
    }

    pub fn to_number(&self) -> f64 {
        match &self.repr {
            Repr::Native(Variant::Number(n)) => *n,
            Repr::Native(Variant::Bool(b)) => f64::from(u8::from(*b)),
            Repr::Native(Variant::String(s)) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Repr::Foreign(_) => {
                let Some((engine, raw)) = self.live() else {
                    return f64::NAN;
                };
                if ffi::is_exception(raw) {
                    return f64::NAN;
                }
                let mut out = f64::NAN;
                if unsafe { qjs::JS_ToFloat64(engine.ctx(), &mut out, raw) } < 0 {
                    unsafe { ffi::discard_exception(engine.ctx()) };
                    return f64::NAN;
                }
                out
            }
            Repr::Invalid | Repr::Cancelled => f64::NAN,
        }
    }

    pub fn to_bool(&self) -> bool {
        match &self.repr {
            Repr::Native(Variant::Bool(b)) => *b,
            Repr::Native(Variant::Number(n)) => *n != 0.0 && !n.is_nan(),
            Repr::Native(Variant::String(s)) => !s.is_empty(),
            Repr::Foreign(_) => match self.live() {
                Some((_, raw)) if ffi::is_exception(raw) => false,
                Some((engine, raw)) => unsafe { qjs::JS_ToBool(engine.ctx(), raw) == 1 },
                None => false,
            },
            Repr::Invalid | Repr::Cancelled => false,
        }
    }

    pub fn to_int32(&self) -> i32 {
        match self.live() {
            Some((engine, raw)) if !ffi::is_exception(raw) => {
                let mut out = 0i32;
                if unsafe { qjs::JS_ToInt32(engine.ctx(), &mut out, raw) } < 0 {
                    unsafe { ffi::discard_exception(engine.ctx()) };
                    return 0;
                }
                out
            }
            Some(_) => 0,
            None => {
                let n = self.to_number();
                if n.is_finite() { n.trunc() as i64 as i32 } else { 0 }
            }
        }
    }

    /// Recursive conversion to JSON-like data, limited to [`VARIANT_DEPTH_LIMIT`]
    /// levels. Functions, symbols and anything nested deeper become `null`.
    pub fn to_variant(&self) -> serde_json::Value {
        self.to_variant_at(0)
    }

    fn to_variant_at(&self, depth: usize) -> serde_json::Value {
        use serde_json::Value as Json;
        match &self.repr {
            Repr::Invalid | Repr::Cancelled => Json::Null,
            Repr::Native(Variant::String(s)) => Json::String(s.clone()),
            Repr::Native(Variant::Number(n)) => number_to_json(*n),
            Repr::Native(Variant::Bool(b)) => Json::Bool(*b),
            Repr::Foreign(_) => {
                if depth > VARIANT_DEPTH_LIMIT || self.is_error() {
                    return Json::Null;
                }
                if self.is_bool() {
                    Json::Bool(self.to_bool())
                } else if self.is_number() {
                    number_to_json(self.to_number())
                } else if self.is_string() {
                    Json::String(self.to_string())
                } else if self.is_function() || !self.is_object() {
                    Json::Null
                } else if self.is_error_object() || self.is_date() {
                    Json::String(self.to_string())
                } else if self.is_array() {
                    let len = self.length();
                    Json::Array(
                        (0..len)
                            .map(|i| self.property_at(i).to_variant_at(depth + 1))
                            .collect(),
                    )
                } else {
                    let mut map = serde_json::Map::new();
                    for prop in crate::iterator::PropertyIterator::new(self) {
                        if prop.key.is_symbol() {
                            continue;
                        }
                        map.insert(prop.name, prop.value.to_variant_at(depth + 1));
                    }
                    Json::Object(map)
                }
            }
        }
    }

    /// For an exception marker: the pending exception as an [`EngineError`].
    /// `None` for anything else.
    pub fn to_error(&self) -> Option<EngineError> {
        if self.is_cancelled() {
            return Some(EngineError::Cancelled);
        }
        let (engine, raw) = self.live()?;
        if !ffi::is_exception(raw) {
            return None;
        }
        let ctx = engine.ctx();
        unsafe {
            ffi::peek_exception(ctx, |exc| {
                let message = ffi::exception_message(ctx, exc);
                let location = error_location(
                    ffi::exception_stack(ctx, exc)
                        .and_then(|stack| ffi::backtrace::innermost_script_frame(&stack)),
                );
                EngineError::script(message, location)
            })
        }
    }

    /// `Ok(self)` unless this is an exception marker or a cancelled result.
    pub fn into_result(self) -> Result<Value, EngineError> {
        match self.to_error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Stack trace of the pending exception this marker stands for.
    pub fn exception_stack(&self) -> Option<String> {
        let (engine, raw) = self.live()?;
        let ctx = engine.ctx();
        if ffi::is_exception(raw) {
            unsafe { ffi::peek_exception(ctx, |exc| ffi::exception_stack(ctx, exc)) }.flatten()
        } else {
            unsafe { ffi::exception_stack(ctx, raw) }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read a named property. Returns an invalid value if this is not a live
    /// object or the getter threw (the exception is discarded).
    pub fn property(&self, name: &str) -> Value {
        let Some((engine, raw)) = self.live() else {
            return Value::invalid();
        };
        let ctx = engine.ctx();
        let Some(atom) = (unsafe { Atom::new(ctx, name) }) else {
            return Value::invalid();
        };
        let result = unsafe { qjs::JS_GetProperty(ctx, raw, atom.raw) };
        engine.adopt_or_discard(result)
    }

    /// Assign a named property with plain `obj[name] = value` semantics.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        self.set_property_with_flags(name, value, PropertyFlags::KEEP_EXISTING_FLAGS)
    }

    /// Define or assign a named property.
    ///
    /// With [`PropertyFlags::KEEP_EXISTING_FLAGS`] (or no flags) this is a plain
    /// assignment. Otherwise the property is (re)defined with the attributes the
    /// flags describe; `PROPERTY_GETTER`/`PROPERTY_SETTER` install `value` as an
    /// accessor half while keeping the other half.
    pub fn set_property_with_flags(
        &self,
        name: &str,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> Result<(), EngineError> {
        let value = value.into();
        let Some((engine, raw)) = self.live() else {
            return Err(EngineError::HostState);
        };
        let ctx = engine.ctx();
        let atom = unsafe { Atom::new(ctx, name) }.ok_or_else(|| EngineError::invalid_name(name))?;
        let val = value.to_raw_owned(engine);
        let rc = unsafe {
            if flags.is_empty() || flags == PropertyFlags::KEEP_EXISTING_FLAGS {
                qjs::JS_SetProperty(ctx, raw, atom.raw, val)
            } else {
                let (v, getter, setter) = if flags.contains(PropertyFlags::PROPERTY_GETTER) {
                    (qjs::JS_UNDEFINED, val, qjs::JS_UNDEFINED)
                } else if flags.contains(PropertyFlags::PROPERTY_SETTER) {
                    (qjs::JS_UNDEFINED, qjs::JS_UNDEFINED, val)
                } else {
                    (val, qjs::JS_UNDEFINED, qjs::JS_UNDEFINED)
                };
                let rc = qjs::JS_DefineProperty(
                    ctx,
                    raw,
                    atom.raw,
                    v,
                    getter,
                    setter,
                    flags.to_runtime_flags(),
                );
                qjs::JS_FreeValue(ctx, val);
                rc
            }
        };
        if rc < 0 {
            return Err(engine.take_script_error());
        }
        Ok(())
    }

    pub fn property_at(&self, index: u32) -> Value {
        let Some((engine, raw)) = self.live() else {
            return Value::invalid();
        };
        let result = unsafe { qjs::JS_GetPropertyUint32(engine.ctx(), raw, index) };
        engine.adopt_or_discard(result)
    }

    pub fn set_property_at(&self, index: u32, value: impl Into<Value>) -> Result<(), EngineError> {
        let value = value.into();
        let Some((engine, raw)) = self.live() else {
            return Err(EngineError::HostState);
        };
        let val = value.to_raw_owned(engine);
        if unsafe { qjs::JS_SetPropertyUint32(engine.ctx(), raw, index, val) } < 0 {
            return Err(engine.take_script_error());
        }
        Ok(())
    }

    pub fn has_property(&self, name: &str) -> bool {
        let Some((engine, raw)) = self.live() else {
            return false;
        };
        if !ffi::is_object(raw) {
            return false;
        }
        let ctx = engine.ctx();
        let Some(atom) = (unsafe { Atom::new(ctx, name) }) else {
            return false;
        };
        match unsafe { qjs::JS_HasProperty(ctx, raw, atom.raw) } {
            1 => true,
            0 => false,
            _ => {
                unsafe { ffi::discard_exception(ctx) };
                false
            }
        }
    }

    /// Delete an own property. Returns false if it could not be deleted.
    pub fn delete_property(&self, name: &str) -> bool {
        let Some((engine, raw)) = self.live() else {
            return false;
        };
        let ctx = engine.ctx();
        let Some(atom) = (unsafe { Atom::new(ctx, name) }) else {
            return false;
        };
        match unsafe { qjs::JS_DeleteProperty(ctx, raw, atom.raw, 0) } {
            1 => true,
            0 => false,
            _ => {
                unsafe { ffi::discard_exception(ctx) };
                false
            }
        }
    }

    /// `length` of an array-like, 0 for anything else.
    pub fn length(&self) -> u32 {
        let Some((engine, raw)) = self.live() else {
            return 0;
        };
        if !ffi::is_object(raw) {
            return 0;
        }
        let mut len: i64 = 0;
        if unsafe { qjs::JS_GetLength(engine.ctx(), raw, &mut len) } < 0 {
            unsafe { ffi::discard_exception(engine.ctx()) };
            return 0;
        }
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════════

    /// Call this function value. Script exceptions come back as an
    /// exception-flagged value.
    pub fn call(&self, this: &Value, args: &[Value]) -> Value {
        let Some((engine, raw)) = self.live() else {
            return Value::invalid();
        };
        let ctx = engine.ctx();
        let this_raw = this.to_raw_owned(engine);
        let mut argv: Vec<RawValue> = args.iter().map(|a| a.to_raw_owned(engine)).collect();
        let result = unsafe {
            qjs::JS_Call(ctx, raw, this_raw, argv.len() as i32, argv.as_mut_ptr())
        };
        unsafe {
            qjs::JS_FreeValue(ctx, this_raw);
            for v in argv {
                qjs::JS_FreeValue(ctx, v);
            }
        }
        engine.adopt(result)
    }

    /// `new this(...args)`.
    pub fn construct(&self, args: &[Value]) -> Value {
        let Some((engine, raw)) = self.live() else {
            return Value::invalid();
        };
        let ctx = engine.ctx();
        let mut argv: Vec<RawValue> = args.iter().map(|a| a.to_raw_owned(engine)).collect();
        let result =
            unsafe { qjs::JS_CallConstructor(ctx, raw, argv.len() as i32, argv.as_mut_ptr()) };
        unsafe {
            for v in argv {
                qjs::JS_FreeValue(ctx, v);
            }
        }
        engine.adopt(result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Comparison
    // ═══════════════════════════════════════════════════════════════════════════

    /// `===` semantics. Native variants compare by value with each other and
    /// with foreign primitives.
    pub fn strictly_equals(&self, other: &Value) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Native(a), Repr::Native(b)) => a == b,
            (Repr::Foreign(a), Repr::Foreign(b)) => {
                if !std::ptr::eq(Rc::as_ptr(&a.engine), Rc::as_ptr(&b.engine)) {
                    return false;
                }
                match self.live() {
                    Some((engine, _)) => unsafe { qjs::JS_IsStrictEqual(engine.ctx(), a.raw, b.raw) },
                    None => false,
                }
            }
            (Repr::Foreign(h), Repr::Native(_)) => {
                let converted = other.to_raw_owned(&h.engine);
                let eq = unsafe { qjs::JS_IsStrictEqual(h.engine.ctx(), h.raw, converted) };
                unsafe { qjs::JS_FreeValue(h.engine.ctx(), converted) };
                eq
            }
            (Repr::Native(_), Repr::Foreign(_)) => other.strictly_equals(self),
            _ => false,
        }
    }

    /// `SameValue` semantics (`Object.is`).
    pub fn equals(&self, other: &Value) -> bool {
        match (self.live(), other.live()) {
            (Some((engine, a)), Some((_, b))) => unsafe { qjs::JS_IsSameValue(engine.ctx(), a, b) },
            _ => self.strictly_equals(other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Debug hooks
    // ═══════════════════════════════════════════════════════════════════════════

    /// Runtime reference count of the underlying heap value, if it has one.
    pub fn foreign_ref_count(&self) -> Option<i32> {
        self.live().and_then(|(_, raw)| ffi::ref_count(raw))
    }

    /// Heap identity, equal for handles to the same object.
    pub fn identity(&self) -> Option<usize> {
        self.raw().and_then(ffi::heap_ptr)
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
