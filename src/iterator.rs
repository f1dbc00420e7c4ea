//! Own-property enumeration for foreign objects.

use rquickjs::qjs;

use crate::engine::Engine;
use crate::ffi::{self, RawValue};
use crate::value::Value;

/// One own enumerable property.
#[derive(Debug, Clone)]
pub struct Property {
    /// Key as text; symbols read as `Symbol(description)`
    pub name: String,
    /// Key as a value (string or symbol)
    pub key: Value,
    pub value: Value,
}

/// Iterates the own enumerable string and symbol keys of an object in the
/// runtime's enumeration order.
///
/// Keys are snapshotted when the iterator is created; values are read when the
/// property is reached, so a property deleted in between yields `undefined`.
/// Anything that is not a live foreign object yields nothing.
pub struct PropertyIterator {
    object: Value,
    keys: std::vec::IntoIter<(String, Value)>,
}

impl PropertyIterator {
    pub fn new(object: &Value) -> Self {
        let keys = match (object.engine(), object.raw()) {
            (Some(engine), Some(raw)) if !engine.is_closed() && ffi::is_object(raw) => {
                unsafe { own_keys(&engine, raw) }
            }
            _ => Vec::new(),
        };
        Self {
            object: object.clone(),
            keys: keys.into_iter(),
        }
    }
}

unsafe fn own_keys(engine: &Engine, obj: RawValue) -> Vec<(String, Value)> {
    let ctx = engine.ctx();
    let mut tab: *mut qjs::JSPropertyEnum = std::ptr::null_mut();
    let mut len: u32 = 0;
    let flags = (qjs::JS_GPN_STRING_MASK | qjs::JS_GPN_SYMBOL_MASK | qjs::JS_GPN_ENUM_ONLY) as i32;
    unsafe {
        if qjs::JS_GetOwnPropertyNames(ctx, &mut tab, &mut len, obj, flags) < 0 {
            ffi::discard_exception(ctx);
            return Vec::new();
        }
        let entries = std::slice::from_raw_parts(tab, len as usize);
        let keys = entries
            .iter()
            .map(|entry| {
                let name = ffi::atom_to_string(ctx, entry.atom);
                let key = engine.adopt(qjs::JS_AtomToValue(ctx, entry.atom));
                (name, key)
            })
            .collect();
        qjs::JS_FreePropertyEnum(ctx, tab, len);
        keys
    }
}

impl Iterator for PropertyIterator {
    type Item = Property;

    fn next(&mut self) -> Option<Property> {
        let (name, key) = self.keys.next()?;
        let value = read_property(&self.object, &key);
        Some(Property { name, key, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for PropertyIterator {}

/// `object[key]` for a string or symbol key. Getter exceptions are swallowed.
fn read_property(object: &Value, key: &Value) -> Value {
    let (Some(engine), Some(obj), Some(key)) = (object.engine(), object.raw(), key.raw()) else {
        return Value::invalid();
    };
    if engine.is_closed() {
        return Value::invalid();
    }
    let ctx = engine.ctx();
    unsafe {
        let atom = qjs::JS_ValueToAtom(ctx, key);
        if atom == qjs::JS_ATOM_NULL {
            ffi::discard_exception(ctx);
            return engine.undefined_value();
        }
        let raw = qjs::JS_GetProperty(ctx, obj, atom);
        qjs::JS_FreeAtom(ctx, atom);
        if ffi::is_exception(raw) {
            ffi::discard_exception(ctx);
            return engine.undefined_value();
        }
        engine.adopt(raw)
    }
}
