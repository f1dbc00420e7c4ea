//! Debuggable embedding host for the QuickJS engine.
//!
//! `quickscript` wraps one QuickJS runtime behind a host-friendly API:
//!
//! - [`Value`]: reference-counted handles to script values, plus engine-free
//!   native variants
//! - [`Engine::register_native`]: typed Rust callbacks exposed as script
//!   functions through a single dispatch trampoline
//! - [`Engine::evaluate`]: scripts and ES modules, with errors returned as values
//! - [`Engine::new_host_object`]: Rust objects reflected into script through a
//!   declared capability list
//! - [`DebugAgent`] / [`DebugController`]: breakpoints and stepping driven from
//!   another thread
//! - [`Engine::deep_clone`] and [`PropertyIterator`]
//!
//! # Example
//!
//! ```ignore
//! use quickscript::EngineHost;
//!
//! let engine = EngineHost::new()?;
//! let result = engine.evaluate("1 + 2 * 3", "example.js", 1);
//! assert_eq!(result.to_number(), 7.0);
//! ```

pub mod agent;
mod builtins;
mod clone;
pub mod config;
pub mod context;
pub mod debug;
pub mod dispatch;
pub mod engine;
pub mod error;
mod ffi;
pub mod iterator;
pub mod module;
pub mod platform;
pub mod prelude;
pub mod reflect;
pub mod value;

pub use agent::{EngineAgent, ScriptId};
pub use config::EngineConfig;
pub use context::{ContextInfo, ExecutionContext};
pub use debug::{
    Breakpoint, DebugAgent, DebugController, DebugEvent, DebugMode, DebugState, EVENT_QUEUE_CAPACITY, PauseReason,
};
pub use dispatch::{CallConvention, DispatchIndex, NativeFn, NativeFunction};
pub use engine::{AbortHandle, Engine, EngineHost, SyntaxCheckResult, SyntaxState};
pub use error::{EngineError, ErrorKind, SourceLocation, StackFrame};
pub use ffi::backtrace::Position;
pub use iterator::{Property, PropertyIterator};
pub use module::{ExportValue, ModuleBuilder};
pub use platform::{
    BufferedConsoleProvider, ConsoleLevel, ConsoleProvider, NoOpConsoleProvider,
    StdConsoleProvider,
};
pub use reflect::{Capability, HostObject, MAX_INVOKE_ARGS, Ownership, SharedHostObject};
pub use value::{PropertyFlags, Value, Variant};
