//! Reflection bridge: host objects exposed to scripts.
//!
//! A [`HostObject`] declares its properties and methods once, as a static
//! [`Capability`] list. [`Engine::new_host_object`] turns that list into a script
//! object of the engine's host class: each property becomes a getter/setter pair
//! and each method an invoker, all registered as ordinary native functions. The
//! functions close over weak references to descriptors owned by a per-object
//! wrapper, and the wrapper is released only by the script object's finalizer.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::{Rc, Weak};

use rquickjs::qjs;

use crate::context::ExecutionContext;
use crate::dispatch::{CallConvention, DispatchIndex, ErasedCallback};
use crate::engine::Engine;
use crate::error::ErrorKind;
use crate::ffi;
use crate::value::{PropertyFlags, Value, Variant};

/// Upper bound on positional arguments passed to [`HostObject::invoke`].
pub const MAX_INVOKE_ARGS: usize = 10;

/// One member a host object exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Property { name: &'static str, writable: bool },
    Method { name: &'static str, arity: usize },
}

impl Capability {
    pub const fn property(name: &'static str) -> Self {
        Capability::Property {
            name,
            writable: true,
        }
    }

    pub const fn read_only(name: &'static str) -> Self {
        Capability::Property {
            name,
            writable: false,
        }
    }

    pub const fn method(name: &'static str, arity: usize) -> Self {
        Capability::Method { name, arity }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Property { name, .. } | Capability::Method { name, .. } => name,
        }
    }
}

/// A native object scripts can read, write and call into.
pub trait HostObject: 'static {
    fn class_name(&self) -> &str;

    fn capabilities(&self) -> &'static [Capability];

    fn get_property(&self, name: &str) -> Option<Variant>;

    /// Store a property. The error text is raised as a `TypeError`.
    fn set_property(&mut self, name: &str, value: Variant) -> Result<(), String>;

    /// Call a method with stringified arguments. The error text is raised as
    /// an `Error`.
    fn invoke(&mut self, method: &str, args: &[String]) -> Result<String, String>;
}

/// Who keeps the host object alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The caller keeps its `Rc`; the script object only holds a weak reference
    /// and reports the object as destroyed once the host drops it.
    HostOwned,
    /// The script object holds the object; its finalizer drops it.
    ScriptOwned,
}

pub type SharedHostObject = Rc<RefCell<dyn HostObject>>;

enum HostTarget {
    Borrowed(Weak<RefCell<dyn HostObject>>),
    Owned(SharedHostObject),
}

impl HostTarget {
    fn get(&self) -> Option<SharedHostObject> {
        match self {
            HostTarget::Borrowed(weak) => weak.upgrade(),
            HostTarget::Owned(rc) => Some(rc.clone()),
        }
    }
}

struct BridgeDescriptor {
    target: Rc<HostTarget>,
    member: &'static str,
}

/// Opaque payload of a host-class object.
struct HostWrapper {
    target: Rc<HostTarget>,
    descriptors: Vec<Rc<BridgeDescriptor>>,
    indices: Vec<DispatchIndex>,
    /// Taken and put back, never borrowed: finalizers run at arbitrary points.
    releases: Rc<Cell<Vec<DispatchIndex>>>,
}

unsafe extern "C" fn host_finalizer(_rt: *mut qjs::JSRuntime, value: qjs::JSValue) {
    let class_id = unsafe { qjs::JS_GetClassID(value) };
    let ptr = unsafe { qjs::JS_GetOpaque(value, class_id) } as *mut HostWrapper;
    if ptr.is_null() {
        return;
    }
    let wrapper = unsafe { Box::from_raw(ptr) };
    let mut releases = wrapper.releases.take();
    releases.extend(wrapper.indices.iter().copied());
    wrapper.releases.set(releases);
}

/// Script value to the variant a host object receives.
fn to_variant(value: &Value) -> Variant {
    if value.is_bool() {
        Variant::Bool(value.to_bool())
    } else if value.is_number() {
        Variant::Number(value.to_number())
    } else {
        Variant::String(value.to_string())
    }
}

fn destroyed(ctx: &mut ExecutionContext<'_>, member: &str) -> Value {
    ctx.throw_error(
        ErrorKind::TypeError,
        &format!("cannot access '{}': host object has been destroyed", member),
    )
}

fn busy(ctx: &mut ExecutionContext<'_>, member: &str) -> Value {
    ctx.throw_error(
        ErrorKind::TypeError,
        &format!("cannot access '{}': host object is in use", member),
    )
}

fn bridge_get(ctx: &mut ExecutionContext<'_>, descriptor: &Weak<BridgeDescriptor>) -> Value {
    let Some(desc) = descriptor.upgrade() else {
        return destroyed(ctx, "property");
    };
    let Some(target) = desc.target.get() else {
        return destroyed(ctx, desc.member);
    };
    let Ok(object) = target.try_borrow() else {
        return busy(ctx, desc.member);
    };
    match object.get_property(desc.member) {
        Some(value) => ctx.engine().new_variant(value),
        None => ctx.engine().undefined_value(),
    }
}

fn bridge_set(ctx: &mut ExecutionContext<'_>, descriptor: &Weak<BridgeDescriptor>) -> Value {
    let Some(desc) = descriptor.upgrade() else {
        return destroyed(ctx, "property");
    };
    let Some(target) = desc.target.get() else {
        return destroyed(ctx, desc.member);
    };
    let value = to_variant(&ctx.argument(0));
    let Ok(mut object) = target.try_borrow_mut() else {
        return busy(ctx, desc.member);
    };
    match object.set_property(desc.member, value) {
        Ok(()) => Value::invalid(),
        Err(message) => {
            drop(object);
            ctx.throw_error(ErrorKind::TypeError, &message)
        }
    }
}

fn bridge_invoke(ctx: &mut ExecutionContext<'_>, descriptor: &Weak<BridgeDescriptor>) -> Value {
    let Some(desc) = descriptor.upgrade() else {
        return destroyed(ctx, "method");
    };
    if ctx.argument_count() > MAX_INVOKE_ARGS {
        let message = format!(
            "{}() accepts at most {} arguments",
            desc.member, MAX_INVOKE_ARGS
        );
        return ctx.throw_error(ErrorKind::RangeError, &message);
    }
    let Some(target) = desc.target.get() else {
        return destroyed(ctx, desc.member);
    };
    let args: Vec<String> = ctx.arguments().iter().map(Value::to_string).collect();
    let Ok(mut object) = target.try_borrow_mut() else {
        return busy(ctx, desc.member);
    };
    let result = object.invoke(desc.member, &args);
    drop(object);
    match result {
        Ok(text) => Value::from(text),
        Err(message) => ctx.throw_error(ErrorKind::Error, &message),
    }
}

impl Engine {
    /// Per-engine class for host objects, registered on first use.
    fn host_class_id(&self) -> Option<qjs::JSClassID> {
        let id = self.host_class.get();
        if id != 0 {
            return Some(id);
        }
        let mut id: qjs::JSClassID = 0;
        let def = qjs::JSClassDef {
            class_name: c"HostObject".as_ptr(),
            finalizer: Some(host_finalizer),
            gc_mark: None,
            call: None,
            exotic: std::ptr::null_mut(),
        };
        unsafe {
            qjs::JS_NewClassID(self.rt(), &mut id);
            if qjs::JS_NewClass(self.rt(), id, &def) < 0 {
                return None;
            }
            let proto = qjs::JS_NewObject(self.ctx());
            if ffi::is_exception(proto) {
                ffi::discard_exception(self.ctx());
                return None;
            }
            qjs::JS_SetClassProto(self.ctx(), id, proto);
        }
        self.host_class.set(id);
        Some(id)
    }

    /// Expose `object` to scripts. Returns an invalid value if the engine is
    /// shut down or the bridge could not be built.
    pub fn new_host_object<T: HostObject>(&self, object: Rc<RefCell<T>>, ownership: Ownership) -> Value {
        let object: SharedHostObject = object;
        if self.is_closed() {
            return Value::invalid();
        }
        self.drain_bridge_releases();
        let Some(class_id) = self.host_class_id() else {
            return Value::invalid();
        };
        let (class_name, capabilities) = match object.try_borrow() {
            Ok(o) => (o.class_name().to_string(), o.capabilities()),
            Err(_) => return Value::invalid(),
        };

        let raw = unsafe { qjs::JS_NewObjectClass(self.ctx(), class_id as i32) };
        let script_object = self.adopt_or_discard(raw);
        if !script_object.is_valid() {
            return Value::invalid();
        }

        let target = Rc::new(match ownership {
            Ownership::HostOwned => HostTarget::Borrowed(Rc::downgrade(&object)),
            Ownership::ScriptOwned => HostTarget::Owned(object),
        });
        let mut wrapper = Box::new(HostWrapper {
            target: target.clone(),
            descriptors: Vec::with_capacity(capabilities.len()),
            indices: Vec::new(),
            releases: self.bridge_releases.clone(),
        });

        let built = self.build_bridge(&script_object, &class_name, capabilities, &target, &mut wrapper);
        // The wrapper goes in even on failure so the finalizer releases what
        // was registered.
        unsafe {
            let raw = script_object.raw().unwrap_or(qjs::JS_UNDEFINED);
            qjs::JS_SetOpaque(raw, Box::into_raw(wrapper) as *mut c_void);
        }
        match built {
            true => script_object,
            false => Value::invalid(),
        }
    }

    fn build_bridge(
        &self,
        object: &Value,
        class_name: &str,
        capabilities: &'static [Capability],
        target: &Rc<HostTarget>,
        wrapper: &mut HostWrapper,
    ) -> bool {
        for capability in capabilities {
            let descriptor = Rc::new(BridgeDescriptor {
                target: target.clone(),
                member: capability.name(),
            });
            let weak = Rc::downgrade(&descriptor);
            wrapper.descriptors.push(descriptor);

            match *capability {
                Capability::Property { name, writable } => {
                    let getter_desc = weak.clone();
                    let Some(getter) = self.bridge_function(name, 0, wrapper, move |ctx| {
                        bridge_get(ctx, &getter_desc)
                    }) else {
                        return false;
                    };
                    if object
                        .set_property_with_flags(name, getter, PropertyFlags::PROPERTY_GETTER)
                        .is_err()
                    {
                        return false;
                    }
                    if writable {
                        let setter_desc = weak;
                        let Some(setter) = self.bridge_function(name, 1, wrapper, move |ctx| {
                            bridge_set(ctx, &setter_desc)
                        }) else {
                            return false;
                        };
                        if object
                            .set_property_with_flags(name, setter, PropertyFlags::PROPERTY_SETTER)
                            .is_err()
                        {
                            return false;
                        }
                    }
                }
                Capability::Method { name, arity } => {
                    let Some(method) = self.bridge_function(name, arity as u32, wrapper, move |ctx| {
                        bridge_invoke(ctx, &weak)
                    }) else {
                        return false;
                    };
                    if object
                        .set_property_with_flags(name, method, PropertyFlags::SKIP_IN_ENUMERATION)
                        .is_err()
                    {
                        return false;
                    }
                }
            }
        }

        let label = format!("[object {}]", class_name);
        let Some(to_string) = self.bridge_function("toString", 0, wrapper, move |_ctx| {
            Value::from(label.as_str())
        }) else {
            return false;
        };
        object
            .set_property_with_flags("toString", to_string, PropertyFlags::SKIP_IN_ENUMERATION)
            .is_ok()
    }

    fn bridge_function<F>(&self, name: &str, arity: u32, wrapper: &mut HostWrapper, f: F) -> Option<Value>
    where
        F: Fn(&mut ExecutionContext<'_>) -> Value + 'static,
    {
        let callback: ErasedCallback = Box::new(move |ctx, _engine, _data| Some(f(ctx)));
        let native = self
            .register_entry(name, arity, CallConvention::Plain, callback, Box::new(()))
            .ok()?;
        wrapper.indices.push(native.index);
        Some(native.function)
    }

    /// The host object behind a script object created by
    /// [`Engine::new_host_object`], if it is still alive.
    pub fn host_object_of(&self, value: &Value) -> Option<SharedHostObject> {
        let class_id = self.host_class.get();
        if class_id == 0 || self.is_closed() {
            return None;
        }
        let raw = value.raw()?;
        let ptr = unsafe { qjs::JS_GetOpaque(raw, class_id) } as *const HostWrapper;
        if ptr.is_null() {
            return None;
        }
        unsafe { (*ptr).target.get() }
    }

    /// Members bridged onto a host-class object, in declaration order.
    pub fn host_members(&self, value: &Value) -> Vec<&'static str> {
        let class_id = self.host_class.get();
        let Some(raw) = value.raw() else {
            return Vec::new();
        };
        if class_id == 0 || self.is_closed() {
            return Vec::new();
        }
        let ptr = unsafe { qjs::JS_GetOpaque(raw, class_id) } as *const HostWrapper;
        if ptr.is_null() {
            return Vec::new();
        }
        unsafe { (*ptr).descriptors.iter().map(|d| d.member).collect() }
    }
}
