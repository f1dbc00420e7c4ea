//! Per-call execution context handed to native callbacks.

use rquickjs::qjs;

use crate::engine::Engine;
use crate::error::{ErrorKind, StackFrame};
use crate::ffi::{self, backtrace};
use crate::value::Value;

/// Where the current native call came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextInfo {
    /// Name of the native function being executed
    pub function_name: Option<String>,
    /// Script file of the innermost calling frame
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// State of one native function invocation.
///
/// Created by the dispatch trampoline right before the callback runs and dropped
/// right after it returns. Argument handles are duplicated up front and released
/// with the context.
pub struct ExecutionContext<'a> {
    engine: &'a Engine,
    this_value: Value,
    arguments: Vec<Value>,
    callee: Value,
    constructor: bool,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        this_value: Value,
        arguments: Vec<Value>,
        callee: Value,
        constructor: bool,
    ) -> Self {
        Self {
            engine,
            this_value,
            arguments,
            callee,
            constructor,
        }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// Argument `index`, or an invalid value when out of range.
    pub fn argument(&self, index: usize) -> Value {
        self.arguments.get(index).cloned().unwrap_or_default()
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// All arguments as a fresh script array.
    pub fn arguments_object(&self) -> Value {
        let array = self.engine.new_array(0);
        for (i, arg) in self.arguments.iter().enumerate() {
            if array.set_property_at(i as u32, arg.clone()).is_err() {
                return self.engine.exception_marker();
            }
        }
        array
    }

    /// `this` for the call. For constructor calls this is the freshly created
    /// instance.
    pub fn this_object(&self) -> Value {
        self.this_value.clone()
    }

    pub fn callee(&self) -> Value {
        self.callee.clone()
    }

    pub fn is_called_as_constructor(&self) -> bool {
        self.constructor
    }

    /// Whether the engine has been asked to abort. Long-running callbacks poll
    /// this and return [`ExecutionContext::throw_cancellation`].
    pub fn is_interrupt_requested(&self) -> bool {
        self.engine.interrupt_requested()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Raising exceptions
    // ═══════════════════════════════════════════════════════════════════════════

    /// Raise a new error and return the exception marker. Nothing unwinds: the
    /// callback must return the marker for the exception to propagate.
    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        unsafe { ffi::throw_error(self.engine.ctx(), kind, message) };
        self.engine.exception_marker()
    }

    /// Raise an arbitrary value.
    pub fn throw_value(&mut self, value: Value) -> Value {
        let raw = value.to_raw_owned(self.engine);
        unsafe { qjs::JS_Throw(self.engine.ctx(), raw) };
        self.engine.exception_marker()
    }

    /// Raise the uncatchable cancellation error.
    pub fn throw_cancellation(&mut self) -> Value {
        unsafe { ffi::throw_interrupted(self.engine.ctx()) };
        self.engine.exception_marker()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Introspection
    // ═══════════════════════════════════════════════════════════════════════════

    /// Call stack at this point, innermost frame first. The first frame is the
    /// native function itself.
    pub fn backtrace(&self) -> Vec<StackFrame> {
        match unsafe { ffi::capture_stack(self.engine.ctx()) } {
            Some(stack) => backtrace::parse_stack(&stack),
            None => Vec::new(),
        }
    }

    pub fn info(&self) -> ContextInfo {
        let frames = self.backtrace();
        let function_name = frames
            .first()
            .filter(|frame| frame.is_native())
            .and_then(|frame| frame.function_name.clone())
            .or_else(|| {
                let name = self.callee.property("name");
                name.is_string().then(|| name.to_string())
            });
        match frames.into_iter().find(|f| !f.is_native() && f.line > 0) {
            Some(caller) => ContextInfo {
                function_name,
                file: caller.file,
                line: caller.line,
                column: caller.column,
            },
            None => ContextInfo {
                function_name,
                ..ContextInfo::default()
            },
        }
    }
}
