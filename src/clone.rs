//! Structural deep copy of script values.

use rquickjs::qjs;

use crate::engine::Engine;
use crate::error::ErrorKind;
use crate::ffi;
use crate::iterator::PropertyIterator;
use crate::prelude::FxHashSet;
use crate::value::Value;

enum CloneFailure {
    Cycle,
    TooDeep,
    /// The runtime raised an exception while building the copy
    Pending,
}

struct Cloner<'a> {
    engine: &'a Engine,
    /// Objects on the current recursion path
    path: FxHashSet<usize>,
    depth_limit: usize,
}

impl Engine {
    /// Copy `value` so that mutating the copy can never affect the original.
    ///
    /// - Primitives become fresh values; symbols keep their identity.
    /// - Arrays are copied element by element, recursively.
    /// - Functions are returned by reference.
    /// - Dates are rebuilt from their time value.
    /// - Other objects become plain objects holding recursive copies of their own
    ///   enumerable string and symbol properties.
    ///
    /// A structure that refers back to an object currently being copied raises a
    /// `TypeError`; nesting deeper than [`crate::EngineConfig::clone_depth_limit`]
    /// raises a `RangeError`. Both come back as exception values. Shared
    /// substructure that is not cyclic is copied once per reference.
    pub fn deep_clone(&self, value: &Value) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let mut cloner = Cloner {
            engine: self,
            path: FxHashSet::default(),
            depth_limit: self.config().clone_depth_limit,
        };
        match cloner.clone_value(value, 0) {
            Ok(copy) => copy,
            Err(CloneFailure::Cycle) => self.raise(ErrorKind::TypeError, "cannot clone cyclic structure"),
            Err(CloneFailure::TooDeep) => self.raise(
                ErrorKind::RangeError,
                &format!("clone depth limit of {} exceeded", self.config().clone_depth_limit),
            ),
            Err(CloneFailure::Pending) => self.exception_marker(),
        }
    }

    fn raise(&self, kind: ErrorKind, message: &str) -> Value {
        unsafe { ffi::throw_error(self.ctx(), kind, message) };
        self.exception_marker()
    }
}

impl Cloner<'_> {
    fn clone_value(&mut self, value: &Value, depth: usize) -> Result<Value, CloneFailure> {
        if !value.is_valid() || value.is_native() || value.is_error() {
            return Ok(value.clone());
        }
        if value.is_string() {
            return Ok(self.engine.new_string(&value.to_string()));
        }
        if value.is_symbol() || value.is_function() || !value.is_object() {
            // Numbers, booleans, null and undefined are immediates; duplicating
            // the handle already yields an independent value.
            return Ok(value.clone());
        }
        if depth >= self.depth_limit {
            return Err(CloneFailure::TooDeep);
        }
        let identity = value.identity().unwrap_or_default();
        if !self.path.insert(identity) {
            return Err(CloneFailure::Cycle);
        }
        let result = if value.is_array() {
            self.clone_array(value, depth)
        } else if value.is_date() {
            self.clone_date(value)
        } else {
            self.clone_object(value, depth)
        };
        self.path.remove(&identity);
        result
    }

    fn clone_array(&mut self, array: &Value, depth: usize) -> Result<Value, CloneFailure> {
        let copy = self.engine.new_array(0);
        if !copy.is_valid() {
            return Err(CloneFailure::Pending);
        }
        for i in 0..array.length() {
            let element = self.clone_value(&array.property_at(i), depth + 1)?;
            copy.set_property_at(i, element)
                .map_err(|_| CloneFailure::Pending)?;
        }
        Ok(copy)
    }

    fn clone_date(&mut self, date: &Value) -> Result<Value, CloneFailure> {
        let ctx = self.engine.ctx();
        let raw = unsafe { qjs::JS_NewDate(ctx, date.to_number()) };
        if ffi::is_exception(raw) {
            return Err(CloneFailure::Pending);
        }
        Ok(self.engine.adopt(raw))
    }

    fn clone_object(&mut self, object: &Value, depth: usize) -> Result<Value, CloneFailure> {
        let copy = self.engine.new_object();
        let Some(target) = copy.raw() else {
            return Err(CloneFailure::Pending);
        };
        for prop in PropertyIterator::new(object) {
            let value = self.clone_value(&prop.value, depth + 1)?;
            let Some(key) = prop.key.raw() else {
                continue;
            };
            let ctx = self.engine.ctx();
            let rc = unsafe {
                let atom = qjs::JS_ValueToAtom(ctx, key);
                if atom == qjs::JS_ATOM_NULL {
                    return Err(CloneFailure::Pending);
                }
                let val = value.to_raw_owned(self.engine);
                let rc = qjs::JS_DefinePropertyValue(ctx, target, atom, val, qjs::JS_PROP_C_W_E as i32);
                qjs::JS_FreeAtom(ctx, atom);
                rc
            };
            if rc < 0 {
                return Err(CloneFailure::Pending);
            }
        }
        Ok(copy)
    }
}
