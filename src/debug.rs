//! Interactive debugging: breakpoints, stepping and pause/resume.
//!
//! The engine runs on one thread and is not `Send`; debugging is driven from
//! another. [`DebugAgent::new`] returns the two halves:
//!
//! - [`DebugAgent`] is attached to the engine as its [`EngineAgent`]. It tracks
//!   call depth and, when a position warrants a pause, blocks the execution
//!   thread on a condition variable.
//! - [`DebugController`] is `Clone + Send + Sync` and issues commands
//!   (`continue_execution`, `step_over`, ...) that clear the pause and wake the
//!   execution thread.
//!
//! Both share one mutex-protected [`DebugState`]; the lock is released while the
//! execution thread waits. Notable moments are also published as [`DebugEvent`]s
//! on a channel.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::agent::{EngineAgent, ScriptId};
use crate::engine::{AbortHandle, Engine};
use crate::ffi::backtrace::Position;
use crate::platform::{ConsoleLevel, ConsoleProvider};
use crate::prelude::{FxHashMap, IndexMap, index_map_new};
use crate::value::Value;

/// Stepping mode of the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    /// Never pause
    NoDebug,
    /// Pause at the next position
    StepIn,
    /// Pause at the next position at or above the depth the step started at
    StepOver,
    /// Pause once the current function has returned
    StepOut,
    /// Pause at breakpoints only
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub file: String,
    pub line: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint,
    Step,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    ScriptLoaded { script_id: ScriptId, file: String },
    ScriptUnloaded { script_id: ScriptId },
    Paused { position: Position, reason: PauseReason },
    Resumed,
    Exception {
        script_id: ScriptId,
        message: String,
        position: Position,
    },
    Log { level: ConsoleLevel, message: String },
}

/// Everything the two halves share. Only touched under the lock.
#[derive(Debug)]
pub struct DebugState {
    pub mode: DebugMode,
    pub step_over_depth: i64,
    pub step_out_depth: i64,
    pub current_depth: i64,
    pub paused: bool,
    breakpoints: IndexMap<(String, u32), bool>,
    current: Position,
    last_notified: Option<(ScriptId, u32, u32)>,
    scripts: FxHashMap<ScriptId, String>,
}

impl Default for DebugState {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugState {
    pub fn new() -> Self {
        Self {
            mode: DebugMode::Continue,
            step_over_depth: 0,
            step_out_depth: 0,
            current_depth: 0,
            paused: false,
            breakpoints: index_map_new(),
            current: Position::default(),
            last_notified: None,
            scripts: FxHashMap::default(),
        }
    }

    pub fn current_position(&self) -> &Position {
        &self.current
    }

    pub fn set_current_position(&mut self, position: Position) {
        self.current = position;
    }

    pub fn add_breakpoint(&mut self, file: &str, line: u32) {
        self.breakpoints.insert((file.to_string(), line), true);
    }

    pub fn remove_breakpoint(&mut self, file: &str, line: u32) -> bool {
        self.breakpoints
            .shift_remove(&(file.to_string(), line))
            .is_some()
    }

    pub fn enable_breakpoint(&mut self, file: &str, line: u32, enabled: bool) -> bool {
        match self.breakpoints.get_mut(&(file.to_string(), line)) {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    pub fn has_breakpoint(&self, file: &str, line: u32) -> bool {
        self.breakpoints
            .get(&(file.to_string(), line))
            .copied()
            .unwrap_or(false)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .iter()
            .map(|((file, line), enabled)| Breakpoint {
                file: file.clone(),
                line: *line,
                enabled: *enabled,
            })
            .collect()
    }

    /// Apply a controller command. Every command resumes a paused thread.
    pub fn apply(&mut self, mode: DebugMode) {
        self.mode = mode;
        match mode {
            DebugMode::StepOver => self.step_over_depth = self.current_depth,
            DebugMode::StepOut => self.step_out_depth = self.current_depth - 1,
            _ => {}
        }
        self.paused = false;
    }

    /// Decide whether the current position warrants a pause.
    pub fn should_pause_at_position(&self) -> Option<PauseReason> {
        if self.mode == DebugMode::NoDebug || self.paused {
            return None;
        }
        let at_breakpoint = self.has_breakpoint(&self.current.file, self.current.line);
        let stepped = match self.mode {
            DebugMode::NoDebug | DebugMode::Continue => false,
            DebugMode::StepIn => true,
            DebugMode::StepOver => self.current_depth <= self.step_over_depth,
            DebugMode::StepOut => self.current_depth <= self.step_out_depth,
        };
        if at_breakpoint {
            Some(PauseReason::Breakpoint)
        } else if stepped {
            Some(PauseReason::Step)
        } else {
            None
        }
    }
}

/// Events kept for a controller that is not draining [`DebugController::events`].
/// Newer events are dropped once the queue is full.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

struct Shared {
    state: Mutex<DebugState>,
    resumed: Condvar,
    paused: Condvar,
    events: Sender<DebugEvent>,
    abort: AbortHandle,
}

impl Shared {
    fn send(&self, event: DebugEvent) {
        publish(&self.events, event);
    }

    fn command(&self, mode: DebugMode) {
        self.state.lock().apply(mode);
        self.resumed.notify_all();
    }
}

// ============================================================================
// Execution side
// ============================================================================

/// The half of the debugger that lives on the execution thread.
pub struct DebugAgent {
    shared: Arc<Shared>,
}

impl DebugAgent {
    /// Create an agent/controller pair. `abort` is used by
    /// [`DebugController::stop_debugging`].
    pub fn new(abort: AbortHandle) -> (DebugAgent, DebugController) {
        let (tx, rx) = channel::bounded(EVENT_QUEUE_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(DebugState::new()),
            resumed: Condvar::new(),
            paused: Condvar::new(),
            events: tx,
            abort,
        });
        let controller = DebugController {
            shared: shared.clone(),
            events: rx,
        };
        (DebugAgent { shared }, controller)
    }

    /// Create a pair and attach the agent to `engine`.
    pub fn attach(engine: &Engine) -> DebugController {
        let (agent, controller) = DebugAgent::new(engine.abort_handle());
        engine.set_agent(Some(Rc::new(agent)));
        controller
    }
}

impl EngineAgent for DebugAgent {
    fn script_load(&self, id: ScriptId, _program: &str, file_name: &str, _base_line: u32) {
        self.shared
            .state
            .lock()
            .scripts
            .insert(id, file_name.to_string());
        self.shared.send(DebugEvent::ScriptLoaded {
            script_id: id,
            file: file_name.to_string(),
        });
    }

    fn script_unload(&self, id: ScriptId) {
        self.shared.state.lock().scripts.remove(&id);
        self.shared.send(DebugEvent::ScriptUnloaded { script_id: id });
    }

    fn function_entry(&self, _script_id: ScriptId) {
        self.shared.state.lock().current_depth += 1;
    }

    fn function_exit(&self, _script_id: ScriptId, _return_value: &Value) {
        let mut state = self.shared.state.lock();
        state.current_depth -= 1;
        // The next call from the same site (a loop body) is a new visit.
        state.last_notified = None;
    }

    fn position_change(&self, script_id: ScriptId, line: u32, column: u32) {
        let mut state = self.shared.state.lock();
        let key = (script_id, line, column);
        if state.last_notified == Some(key) {
            return;
        }
        state.last_notified = Some(key);
        let file = state.scripts.get(&script_id).cloned().unwrap_or_default();
        state.current = Position::new(file, line, column);

        let Some(reason) = state.should_pause_at_position() else {
            return;
        };
        state.paused = true;
        self.shared.send(DebugEvent::Paused {
            position: state.current.clone(),
            reason,
        });
        self.shared.paused.notify_all();
        while state.paused {
            self.shared.resumed.wait(&mut state);
        }
        drop(state);
        self.shared.send(DebugEvent::Resumed);
    }

    fn exception_throw(&self, script_id: ScriptId, exception: &Value, _has_handler: bool) {
        let position = self.shared.state.lock().current.clone();
        self.shared.send(DebugEvent::Exception {
            script_id,
            message: exception.to_string(),
            position,
        });
    }

    fn detach(&self) {
        self.shared.command(DebugMode::NoDebug);
    }
}

// ============================================================================
// Controller side
// ============================================================================

/// Remote control for a [`DebugAgent`]. Usable from any thread.
#[derive(Clone)]
pub struct DebugController {
    shared: Arc<Shared>,
    events: Receiver<DebugEvent>,
}

impl DebugController {
    pub fn add_breakpoint(&self, file: &str, line: u32) {
        self.shared.state.lock().add_breakpoint(file, line);
    }

    pub fn remove_breakpoint(&self, file: &str, line: u32) -> bool {
        self.shared.state.lock().remove_breakpoint(file, line)
    }

    pub fn enable_breakpoint(&self, file: &str, line: u32, enabled: bool) -> bool {
        self.shared.state.lock().enable_breakpoint(file, line, enabled)
    }

    pub fn clear_breakpoints(&self) {
        self.shared.state.lock().breakpoints.clear();
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.shared.state.lock().breakpoints()
    }

    pub fn continue_execution(&self) {
        self.shared.command(DebugMode::Continue);
    }

    pub fn step_into(&self) {
        self.shared.command(DebugMode::StepIn);
    }

    pub fn step_over(&self) {
        self.shared.command(DebugMode::StepOver);
    }

    pub fn step_out(&self) {
        self.shared.command(DebugMode::StepOut);
    }

    /// Pause at the next reported position.
    pub fn pause(&self) {
        self.shared.command(DebugMode::StepIn);
    }

    /// Stop pausing altogether and abort the running evaluation.
    pub fn stop_debugging(&self) {
        self.shared.command(DebugMode::NoDebug);
        self.shared.abort.abort();
    }

    pub fn mode(&self) -> DebugMode {
        self.shared.state.lock().mode
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    pub fn current_depth(&self) -> i64 {
        self.shared.state.lock().current_depth
    }

    pub fn current_position(&self) -> Position {
        self.shared.state.lock().current.clone()
    }

    /// Block until the execution thread pauses or `timeout` elapses. Returns
    /// whether it is paused.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.paused {
            if self.shared.paused.wait_until(&mut state, deadline).timed_out() {
                return state.paused;
            }
        }
        true
    }

    /// Event stream. Every clone of the controller reads from the same queue.
    pub fn events(&self) -> &Receiver<DebugEvent> {
        &self.events
    }

    /// Drain the events queued so far.
    pub fn take_events(&self) -> Vec<DebugEvent> {
        self.events.try_iter().collect()
    }

    /// Console provider that writes through to `inner` and also publishes each
    /// line as a [`DebugEvent::Log`].
    pub fn console_forwarder(&self, inner: Rc<dyn ConsoleProvider>) -> Rc<dyn ConsoleProvider> {
        Rc::new(ForwardingConsole {
            inner,
            events: self.shared.events.clone(),
        })
    }
}

/// Queue `event` without blocking the execution thread. A full queue or a
/// dropped receiver discards it.
fn publish(events: &Sender<DebugEvent>, event: DebugEvent) {
    let _ = events.try_send(event);
}

struct ForwardingConsole {
    inner: Rc<dyn ConsoleProvider>,
    events: Sender<DebugEvent>,
}

impl ConsoleProvider for ForwardingConsole {
    fn write(&self, level: ConsoleLevel, message: &str) {
        self.inner.write(level, message);
        publish(
            &self.events,
            DebugEvent::Log {
                level,
                message: message.to_string(),
            },
        );
    }

    fn clear(&self) {
        self.inner.clear();
    }
}
