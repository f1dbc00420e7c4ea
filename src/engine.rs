//! The engine host: one QuickJS runtime with its single context.
//!
//! [`Engine`] is shared through `Rc` because every foreign [`Value`] keeps its
//! engine alive; the runtime is only freed once the last handle is gone.
//! [`EngineHost`] is the owning front door: dropping it shuts the engine down
//! (agent detached, registrations and module exports released) even while stray
//! handles still exist, after which those handles read as invalid.

use std::cell::{Cell, RefCell};
use std::ffi::{CString, c_char, c_int, c_void};
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use fancy_regex::Regex;
use rquickjs::qjs;

use crate::agent::{EngineAgent, ScriptId};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchIndex, Registry};
use crate::error::{EngineError, ErrorKind, SourceLocation, StackFrame};
use crate::ffi::{self, RawContext, RawValue, backtrace};
use crate::module::ModuleRegistry;
use crate::platform::{ConsoleLevel, ConsoleProvider, StdConsoleProvider};
use crate::value::{Value, Variant};

/// Statement-level `import`/`export` marks a source as an ES module.
static MODULE_SYNTAX: LazyLock<Result<Regex, fancy_regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*(?:import[ \t]*(?:[\w*{]|["'])|export[ \t]+(?:default|const|let|var|function|class|async|\{|\*))"#,
    )
});

pub(crate) fn looks_like_module(source: &str) -> bool {
    match MODULE_SYNTAX.as_ref() {
        Ok(re) => re.is_match(source).unwrap_or(false),
        Err(_) => false,
    }
}

// ============================================================================
// Abort handle
// ============================================================================

/// Thread-safe handle to an engine's interrupt flag.
///
/// The flag is checked by the runtime's interrupt hook, by the dispatch
/// trampoline before every native call and by blocking builtins. `evaluate`
/// clears it on entry.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// A handle not connected to any engine.
    pub fn detached() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

unsafe extern "C" fn interrupt_handler(_rt: *mut qjs::JSRuntime, opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let flag = unsafe { &*(opaque as *const AtomicBool) };
    c_int::from(flag.load(Ordering::Relaxed))
}

// ============================================================================
// Syntax check
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxState {
    Valid,
    /// The source is incomplete (e.g. an unclosed block) rather than wrong
    Intermediate,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxCheckResult {
    pub state: SyntaxState,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl SyntaxCheckResult {
    pub fn is_valid(&self) -> bool {
        self.state == SyntaxState::Valid
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
struct ScriptRecord {
    id: ScriptId,
    file: String,
}

/// Increments the evaluation counter for the lifetime of one `evaluate`.
struct EvalGuard<'a>(&'a Cell<usize>);

impl<'a> EvalGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        EvalGuard(depth)
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

pub struct Engine {
    me: Weak<Engine>,
    rt: *mut qjs::JSRuntime,
    ctx: RawContext,
    config: EngineConfig,
    closed: Cell<bool>,
    interrupt: Arc<AtomicBool>,
    eval_depth: Cell<usize>,
    next_script_id: Cell<ScriptId>,
    scripts: RefCell<Vec<ScriptRecord>>,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) modules: RefCell<ModuleRegistry>,
    agent: RefCell<Option<Rc<dyn EngineAgent>>>,
    console: RefCell<Rc<dyn ConsoleProvider>>,
    pub(crate) host_class: Cell<qjs::JSClassID>,
    /// Dispatch indices of finalized host-object wrappers, released lazily
    pub(crate) bridge_releases: Rc<Cell<Vec<DispatchIndex>>>,
    live_handles: Cell<usize>,
}

impl Engine {
    /// Create a runtime and context configured by `config`.
    pub(crate) fn create(config: EngineConfig) -> Result<Rc<Engine>, EngineError> {
        let rt = unsafe { qjs::JS_NewRuntime() };
        if rt.is_null() {
            return Err(EngineError::Init("JS_NewRuntime failed".into()));
        }
        let ctx = unsafe { qjs::JS_NewContext(rt) };
        if ctx.is_null() {
            unsafe { qjs::JS_FreeRuntime(rt) };
            return Err(EngineError::Init("JS_NewContext failed".into()));
        }

        unsafe {
            if let Some(limit) = config.memory_limit {
                qjs::JS_SetMemoryLimit(rt, limit as qjs::size_t);
            }
            if let Some(size) = config.max_stack_size {
                qjs::JS_SetMaxStackSize(rt, size as qjs::size_t);
            }
            if let Some(threshold) = config.gc_threshold {
                qjs::JS_SetGCThreshold(rt, threshold as qjs::size_t);
            }
        }

        let interrupt = Arc::new(AtomicBool::new(false));
        unsafe {
            qjs::JS_SetInterruptHandler(
                rt,
                Some(interrupt_handler),
                Arc::as_ptr(&interrupt) as *mut c_void,
            );
            qjs::JS_SetModuleLoaderFunc(
                rt,
                None,
                Some(crate::module::module_loader),
                std::ptr::null_mut(),
            );
        }

        let install_builtins = config.install_builtins;
        let engine = Rc::new_cyclic(|me| Engine {
            me: me.clone(),
            rt,
            ctx,
            config,
            closed: Cell::new(false),
            interrupt,
            eval_depth: Cell::new(0),
            next_script_id: Cell::new(1),
            scripts: RefCell::new(Vec::new()),
            registry: RefCell::new(Registry::default()),
            modules: RefCell::new(ModuleRegistry::default()),
            agent: RefCell::new(None),
            console: RefCell::new(Rc::new(StdConsoleProvider)),
            host_class: Cell::new(0),
            bridge_releases: Rc::new(Cell::new(Vec::new())),
            live_handles: Cell::new(0),
        });
        unsafe { qjs::JS_SetContextOpaque(ctx, Rc::as_ptr(&engine) as *mut c_void) };

        if install_builtins {
            crate::builtins::install(&engine)?;
        }
        Ok(engine)
    }

    /// Recover the engine that owns `ctx`.
    ///
    /// # Safety
    /// `ctx` must be a context created by [`Engine::create`]. The opaque pointer
    /// is cleared before the engine's last strong reference is released.
    pub(crate) unsafe fn from_context(ctx: RawContext) -> Option<Rc<Engine>> {
        let ptr = unsafe { qjs::JS_GetContextOpaque(ctx) } as *const Engine;
        if ptr.is_null() {
            return None;
        }
        unsafe {
            Rc::increment_strong_count(ptr);
            Some(Rc::from_raw(ptr))
        }
    }

    pub(crate) fn ctx(&self) -> RawContext {
        self.ctx
    }

    pub(crate) fn rt(&self) -> *mut qjs::JSRuntime {
        self.rt
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    // ========================================================================
    // Handle bookkeeping
    // ========================================================================

    pub(crate) fn handle_created(&self) {
        self.live_handles.set(self.live_handles.get() + 1);
    }

    pub(crate) fn handle_dropped(&self) {
        self.live_handles.set(self.live_handles.get().saturating_sub(1));
    }

    /// Number of foreign [`Value`] handles currently alive.
    pub fn live_handle_count(&self) -> usize {
        self.live_handles.get()
    }

    /// Wrap an owned raw value. Frees it if the engine is being torn down.
    pub(crate) fn adopt(&self, raw: RawValue) -> Value {
        match self.me.upgrade() {
            Some(engine) => Value::adopt(engine, raw),
            None => {
                if ffi::has_ref_count(raw) {
                    unsafe { qjs::JS_FreeValue(self.ctx, raw) };
                }
                Value::invalid()
            }
        }
    }

    /// Like [`Engine::adopt`], but a thrown exception is discarded and reported as
    /// an invalid value.
    pub(crate) fn adopt_or_discard(&self, raw: RawValue) -> Value {
        if ffi::is_exception(raw) {
            unsafe { ffi::discard_exception(self.ctx) };
            return Value::invalid();
        }
        self.adopt(raw)
    }

    /// Marker value for the exception currently pending in the context.
    pub(crate) fn exception_marker(&self) -> Value {
        self.adopt(qjs::JS_EXCEPTION)
    }

    /// Consume the pending exception as a host error.
    pub(crate) fn take_script_error(&self) -> EngineError {
        let marker = self.exception_marker();
        let err = marker
            .to_error()
            .unwrap_or_else(|| EngineError::script("unknown error", None));
        unsafe { ffi::discard_exception(self.ctx) };
        err
    }

    // ========================================================================
    // Interrupts
    // ========================================================================

    /// Ask the running evaluation to stop. Callable from the execution thread
    /// (e.g. a native callback); other threads use [`Engine::abort_handle`].
    pub fn abort_evaluation(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: self.interrupt.clone(),
        }
    }

    pub fn interrupt_requested(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn is_evaluating(&self) -> bool {
        self.eval_depth.get() > 0
    }

    // ========================================================================
    // Agent and console
    // ========================================================================

    /// Attach an agent, detaching the previous one.
    pub fn set_agent(&self, agent: Option<Rc<dyn EngineAgent>>) {
        let previous = self.agent.replace(agent);
        if let Some(previous) = previous {
            previous.detach();
        }
    }

    pub fn agent(&self) -> Option<Rc<dyn EngineAgent>> {
        self.agent.borrow().clone()
    }

    pub fn set_console(&self, console: Rc<dyn ConsoleProvider>) {
        *self.console.borrow_mut() = console;
    }

    pub fn console(&self) -> Rc<dyn ConsoleProvider> {
        self.console.borrow().clone()
    }

    /// Report a position reached by the running script to the agent. For hosts
    /// that have their own statement hook.
    pub fn notify_position(&self, line: u32, column: u32) {
        if let Some(agent) = self.agent() {
            let id = self.current_script_id();
            agent.position_change(id, line, column);
        }
    }

    // ========================================================================
    // Script ids
    // ========================================================================

    pub(crate) fn record_script(&self, file: &str) -> ScriptId {
        let id = self.next_script_id.get();
        self.next_script_id.set(id + 1);
        self.scripts.borrow_mut().push(ScriptRecord {
            id,
            file: file.to_string(),
        });
        id
    }

    /// Most recent script loaded from `file`, `-1` if none.
    pub(crate) fn script_id_for(&self, file: &str) -> ScriptId {
        self.scripts
            .borrow()
            .iter()
            .rev()
            .find(|s| s.file == file)
            .map(|s| s.id)
            .unwrap_or(-1)
    }

    fn current_script_id(&self) -> ScriptId {
        self.scripts.borrow().last().map(|s| s.id).unwrap_or(-1)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate `program` as if it started at `line_number` of `file_name`.
    ///
    /// Script exceptions come back as an exception-flagged value and stay pending
    /// for [`Engine::uncaught_exception`] until the next `evaluate`, which clears
    /// it first (reported to the agent as caught). An evaluation aborted through
    /// the interrupt flag returns a cancelled value and leaves nothing pending.
    pub fn evaluate(&self, program: &str, file_name: &str, line_number: u32) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        if self.is_evaluating() {
            self.console().write(
                ConsoleLevel::Warn,
                "evaluate called while another evaluation is in progress",
            );
            unsafe {
                ffi::throw_error(
                    self.ctx,
                    ErrorKind::InternalError,
                    "evaluate is not re-entrant",
                )
            };
            return self.exception_marker();
        }

        self.clear_exceptions();
        let _guard = EvalGuard::enter(&self.eval_depth);
        self.interrupt.store(false, Ordering::SeqCst);

        let line_number = line_number.max(1);
        let script_id = self.record_script(file_name);
        let agent = self.agent();
        if let Some(agent) = &agent {
            agent.script_load(script_id, program, file_name, line_number);
            agent.function_entry(script_id);
            agent.position_change(script_id, line_number, 1);
        }

        let result = self.run_program(program, file_name, line_number, script_id);

        if let Some(agent) = &agent {
            agent.function_exit(script_id, &result);
        }
        self.drain_bridge_releases();
        result
    }

    fn run_program(&self, program: &str, file_name: &str, line_number: u32, script_id: ScriptId) -> Value {
        let ctx = self.ctx;

        // QuickJS has no line offset parameter; pad with newlines instead so
        // reported lines match the caller's file.
        let mut text = String::with_capacity(program.len() + line_number as usize);
        for _ in 1..line_number {
            text.push('\n');
        }
        text.push_str(program);

        let (source, file) = match (CString::new(text), ffi::cstring(file_name)) {
            (Ok(source), Ok(file)) => (source, file),
            _ => {
                unsafe {
                    ffi::throw_error(ctx, ErrorKind::SyntaxError, "source contains a NUL byte")
                };
                return self.report_exception(script_id);
            }
        };

        let is_module = looks_like_module(program);
        let flags = if is_module {
            qjs::JS_EVAL_TYPE_MODULE
        } else {
            qjs::JS_EVAL_TYPE_GLOBAL
        };
        let mut raw = unsafe {
            qjs::JS_Eval(
                ctx,
                source.as_ptr(),
                source.as_bytes().len() as qjs::size_t,
                file.as_ptr(),
                flags as c_int,
            )
        };
        if is_module && !ffi::is_exception(raw) {
            raw = unsafe { self.settle_module(raw) };
        }
        if ffi::is_exception(raw) {
            return self.report_exception(script_id);
        }
        self.adopt(raw)
    }

    /// Drive a module's evaluation promise to completion. A rejection becomes
    /// the pending exception.
    unsafe fn settle_module(&self, promise: RawValue) -> RawValue {
        let ctx = self.ctx;
        if !unsafe { qjs::JS_IsPromise(promise) } {
            return promise;
        }
        self.run_pending_jobs();
        unsafe {
            let state = qjs::JS_PromiseState(ctx, promise);
            let result = if state == qjs::JSPromiseStateEnum_JS_PROMISE_REJECTED {
                let reason = qjs::JS_PromiseResult(ctx, promise);
                qjs::JS_Throw(ctx, reason)
            } else {
                qjs::JS_UNDEFINED
            };
            qjs::JS_FreeValue(ctx, promise);
            result
        }
    }

    fn report_exception(&self, script_id: ScriptId) -> Value {
        let ctx = self.ctx;
        let uncatchable = unsafe {
            ffi::peek_exception(ctx, |exc| qjs::JS_IsUncatchableError(ctx, exc))
        }
        .unwrap_or(false);
        if self.interrupt_requested() || uncatchable {
            unsafe { ffi::discard_exception(ctx) };
            return Value::cancelled();
        }

        let marker = self.exception_marker();
        if let Some(agent) = self.agent() {
            agent.exception_throw(script_id, &marker, false);
            if let Some(EngineError::Script { message, location }) = marker.to_error() {
                let line = match location {
                    Some(location) => format!("{}: {}", location, message),
                    None => message,
                };
                self.console().write(ConsoleLevel::Error, &line);
            }
        }
        marker
    }

    /// Run queued promise jobs until the queue is empty. Returns how many ran.
    pub fn run_pending_jobs(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let mut count = 0;
        loop {
            let mut job_ctx: RawContext = std::ptr::null_mut();
            let rc = unsafe { qjs::JS_ExecutePendingJob(self.rt, &mut job_ctx) };
            if rc == 0 {
                break;
            }
            count += 1;
            if rc < 0 {
                if self.interrupt_requested() {
                    unsafe { ffi::discard_exception(self.ctx) };
                    break;
                }
                let err = self.take_script_error();
                self.console()
                    .write(ConsoleLevel::Error, &format!("unhandled error in job: {}", err));
            }
        }
        count
    }

    /// Compile `program` without running it.
    pub fn check_syntax(&self, program: &str) -> SyntaxCheckResult {
        let valid = SyntaxCheckResult {
            state: SyntaxState::Valid,
            message: String::new(),
            line: 0,
            column: 0,
        };
        if self.is_closed() {
            return valid;
        }
        let Ok(source) = CString::new(program) else {
            return SyntaxCheckResult {
                state: SyntaxState::Error,
                message: "source contains a NUL byte".into(),
                line: 1,
                column: 1,
            };
        };
        let ctx = self.ctx;
        let kind = if looks_like_module(program) {
            qjs::JS_EVAL_TYPE_MODULE
        } else {
            qjs::JS_EVAL_TYPE_GLOBAL
        };
        let raw = unsafe {
            qjs::JS_Eval(
                ctx,
                source.as_ptr(),
                source.as_bytes().len() as qjs::size_t,
                c"<syntax-check>".as_ptr(),
                (kind | qjs::JS_EVAL_FLAG_COMPILE_ONLY) as c_int,
            )
        };
        if !ffi::is_exception(raw) {
            unsafe { qjs::JS_FreeValue(ctx, raw) };
            return valid;
        }

        let Some(exc) = (unsafe { ffi::take_exception(ctx) }) else {
            return valid;
        };
        let (message, frame) = unsafe {
            let msg = ffi::get_property_str(ctx, exc, c"message");
            let message = if ffi::tag(msg) == qjs::JS_TAG_STRING {
                ffi::to_rust_string(ctx, msg)
            } else {
                None
            }
            .unwrap_or_else(|| ffi::exception_message(ctx, exc));
            qjs::JS_FreeValue(ctx, msg);
            let frame = ffi::exception_stack(ctx, exc)
                .and_then(|stack| backtrace::innermost_script_frame(&stack));
            qjs::JS_FreeValue(ctx, exc);
            (message, frame)
        };
        let (line, column) = frame.map(|f| (f.line, f.column)).unwrap_or((0, 0));
        let last_line = program.lines().count().max(1) as u32;
        let incomplete = line >= last_line
            && (message.contains("expecting") || message.contains("unexpected end"));
        SyntaxCheckResult {
            state: if incomplete {
                SyntaxState::Intermediate
            } else {
                SyntaxState::Error
            },
            message,
            line,
            column,
        }
    }

    // ========================================================================
    // Uncaught exceptions
    // ========================================================================

    pub fn has_uncaught_exception(&self) -> bool {
        !self.is_closed() && unsafe { qjs::JS_HasException(self.ctx) }
    }

    /// The pending exception object, left pending.
    pub fn uncaught_exception(&self) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let ctx = self.ctx;
        match unsafe { ffi::peek_exception(ctx, |exc| qjs::JS_DupValue(ctx, exc)) } {
            Some(raw) => self.adopt(raw),
            None => Value::invalid(),
        }
    }

    fn uncaught_stack(&self) -> Option<String> {
        if self.is_closed() {
            return None;
        }
        let ctx = self.ctx;
        unsafe { ffi::peek_exception(ctx, |exc| ffi::exception_stack(ctx, exc)) }.flatten()
    }

    pub fn uncaught_exception_line_number(&self) -> Option<u32> {
        let stack = self.uncaught_stack()?;
        backtrace::innermost_script_frame(&stack).map(|frame| frame.line)
    }

    pub fn uncaught_exception_backtrace(&self) -> Vec<StackFrame> {
        self.uncaught_stack()
            .map(|stack| backtrace::parse_stack(&stack))
            .unwrap_or_default()
    }

    /// Uncaught exception as a host error, without clearing it.
    pub fn uncaught_error(&self) -> Option<EngineError> {
        if !self.has_uncaught_exception() {
            return None;
        }
        self.exception_marker().to_error()
    }

    /// Clear the pending exception, telling the agent it was handled.
    pub fn clear_exceptions(&self) {
        if self.is_closed() {
            return;
        }
        let Some(exc) = (unsafe { ffi::take_exception(self.ctx) }) else {
            return;
        };
        let value = self.adopt(exc);
        if let Some(agent) = self.agent() {
            agent.exception_catch(self.current_script_id(), &value);
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn global_object(&self) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        self.adopt(unsafe { qjs::JS_GetGlobalObject(self.ctx) })
    }

    pub fn null_value(&self) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        self.adopt(qjs::JS_NULL)
    }

    pub fn undefined_value(&self) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        self.adopt(qjs::JS_UNDEFINED)
    }

    pub fn new_object(&self) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        self.adopt_or_discard(unsafe { qjs::JS_NewObject(self.ctx) })
    }

    /// New array of `length` holes.
    pub fn new_array(&self, length: u32) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let array = self.adopt_or_discard(unsafe { qjs::JS_NewArray(self.ctx) });
        if length > 0 && array.set_property("length", f64::from(length)).is_err() {
            return Value::invalid();
        }
        array
    }

    /// Script string (a foreign handle, unlike `Value::from(&str)`).
    pub fn new_string(&self, text: &str) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        self.adopt_or_discard(unsafe { ffi::new_string(self.ctx, text) })
    }

    pub fn new_symbol(&self, description: &str) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let Ok(desc) = ffi::cstring(description) else {
            return Value::invalid();
        };
        self.adopt_or_discard(unsafe { qjs::JS_NewSymbol(self.ctx, desc.as_ptr(), false) })
    }

    /// Materialize a native variant on the script heap.
    pub fn new_variant(&self, variant: Variant) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let raw = Value::from(variant).to_raw_owned(self);
        self.adopt_or_discard(raw)
    }

    /// Parse JSON text into a script value.
    pub fn parse_json(&self, text: &str) -> Value {
        if self.is_closed() {
            return Value::invalid();
        }
        let Ok(source) = CString::new(text) else {
            return Value::invalid();
        };
        let raw = unsafe {
            qjs::JS_ParseJSON(
                self.ctx,
                source.as_ptr() as *const c_char,
                source.as_bytes().len() as qjs::size_t,
                c"<json>".as_ptr(),
            )
        };
        self.adopt(raw)
    }

    pub fn collect_garbage(&self) {
        if !self.is_closed() {
            unsafe { qjs::JS_RunGC(self.rt) };
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Tear the engine down. Idempotent.
    ///
    /// The agent is detached first (releasing a paused execution thread), then
    /// every registered function and module export is released. Outstanding
    /// handles stay memory-safe and read as invalid afterwards.
    pub fn shutdown(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.interrupt.store(true, Ordering::SeqCst);

        let agent = self.agent.borrow_mut().take();
        if let Some(agent) = agent {
            agent.detach();
            let ids: Vec<ScriptId> = self.scripts.borrow().iter().map(|s| s.id).collect();
            for id in ids {
                agent.script_unload(id);
            }
        }

        self.bridge_releases.take();
        let entries = self.registry.borrow_mut().take_all();
        for entry in &entries {
            let raw = entry.take_function();
            unsafe { qjs::JS_FreeValue(self.ctx, raw) };
        }
        drop(entries);

        let exports = self.modules.borrow_mut().take_all();
        drop(exports);

        unsafe {
            ffi::discard_exception(self.ctx);
            qjs::JS_RunGC(self.rt);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        unsafe {
            qjs::JS_SetContextOpaque(self.ctx, std::ptr::null_mut());
            qjs::JS_FreeContext(self.ctx);
            qjs::JS_FreeRuntime(self.rt);
        }
    }
}

// ============================================================================
// EngineHost
// ============================================================================

/// Owner of an [`Engine`]. Dereferences to the engine; dropping it shuts the
/// engine down.
pub struct EngineHost {
    engine: Rc<Engine>,
}

impl EngineHost {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            engine: Engine::create(config)?,
        })
    }

    /// Shared handle to the engine, e.g. for closures that outlive a call.
    pub fn engine(&self) -> Rc<Engine> {
        self.engine.clone()
    }
}

impl Deref for EngineHost {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

/// Location of a script error, when the stack names one.
pub(crate) fn error_location(frame: Option<StackFrame>) -> Option<SourceLocation> {
    frame.map(|frame| SourceLocation {
        file: frame.file.map(Into::into),
        line: frame.line,
        column: frame.column,
    })
}
