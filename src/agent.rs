//! Observer interface for engine execution events.
//!
//! An [`EngineAgent`] attached with [`crate::Engine::set_agent`] is notified on the
//! execution thread as scripts load, functions are entered and left, positions
//! change and exceptions are thrown. Every method has a no-op default so agents
//! only implement what they care about.
//!
//! Hooks run synchronously inside evaluation. An agent may block (the debugger
//! does while paused) but must not re-enter `evaluate`.

use crate::value::Value;

/// Identifier handed out per evaluated script; `-1` when a position cannot be
/// attributed to a known script.
pub type ScriptId = i64;

pub trait EngineAgent {
    /// A script was handed to `evaluate`.
    fn script_load(&self, _id: ScriptId, _program: &str, _file_name: &str, _base_line: u32) {}

    /// A script's resources were released (engine shutdown).
    fn script_unload(&self, _id: ScriptId) {}

    /// A new execution context was pushed (native call boundary).
    fn context_push(&self) {}

    /// The matching pop for [`EngineAgent::context_push`].
    fn context_pop(&self) {}

    fn function_entry(&self, _script_id: ScriptId) {}

    fn function_exit(&self, _script_id: ScriptId, _return_value: &Value) {}

    /// Execution reached a new source position.
    fn position_change(&self, _script_id: ScriptId, _line: u32, _column: u32) {}

    /// An exception escaped to the host. `has_handler` is false for uncaught
    /// exceptions returned from `evaluate`.
    fn exception_throw(&self, _script_id: ScriptId, _exception: &Value, _has_handler: bool) {}

    /// A pending exception was cleared by the host.
    fn exception_catch(&self, _script_id: ScriptId, _exception: &Value) {}

    /// The agent is being detached or the engine is shutting down. Agents that
    /// block the execution thread must release it here.
    fn detach(&self) {}

    /// Whether the engine should synthesize `position_change` calls at native
    /// call sites. Capturing a position costs a backtrace, so agents that do not
    /// need positions can opt out.
    fn wants_positions(&self) -> bool {
        true
    }
}
