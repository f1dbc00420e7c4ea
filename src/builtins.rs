//! Host functions installed on the global object: `console`, `print` and `sleep`.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::context::ExecutionContext;
use crate::dispatch::CallConvention;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::platform::ConsoleLevel;
use crate::value::Value;

/// Interval at which `sleep` checks the interrupt flag.
const SLEEP_POLL_INTERVAL: Duration = Duration::from_millis(1);

const CONSOLE_METHODS: [(&str, ConsoleLevel); 5] = [
    ("log", ConsoleLevel::Log),
    ("info", ConsoleLevel::Info),
    ("debug", ConsoleLevel::Debug),
    ("warn", ConsoleLevel::Warn),
    ("error", ConsoleLevel::Error),
];

pub(crate) fn install(engine: &Rc<Engine>) -> Result<(), EngineError> {
    let global = engine.global_object();

    let console = engine.new_object();
    for (name, level) in CONSOLE_METHODS {
        let native = engine.register_native(name, 0, CallConvention::Plain, console_write, level)?;
        console.set_property(name, native.function)?;
    }
    global.set_property("console", console)?;

    let print = engine.register_native("print", 0, CallConvention::Plain, console_write, ConsoleLevel::Log)?;
    global.set_property("print", print.function)?;

    let sleep = engine.register_native("sleep", 1, CallConvention::Plain, sleep, ())?;
    global.set_property("sleep", sleep.function)?;
    Ok(())
}

fn console_write(ctx: &mut ExecutionContext<'_>, engine: &Engine, level: &ConsoleLevel) -> Value {
    let output: Vec<String> = ctx.arguments().iter().map(format_argument).collect();
    engine.console().write(*level, &output.join(" "));
    Value::invalid()
}

/// Strings print bare; plain objects and arrays print as JSON.
fn format_argument(value: &Value) -> String {
    if value.is_object() && !value.is_function() && !value.is_error_object() && !value.is_date() {
        if let Ok(json) = serde_json::to_string(&value.to_variant()) {
            return json;
        }
    }
    value.to_string()
}

/// `sleep(ms)`: block the execution thread, returning early with a cancellation
/// when the engine is asked to abort.
fn sleep(ctx: &mut ExecutionContext<'_>, _engine: &Engine, _data: &()) -> Value {
    let ms = ctx.argument(0).to_number();
    let ms = if ms.is_finite() && ms > 0.0 { ms } else { 0.0 };
    // An unrepresentable deadline sleeps until interrupted.
    let deadline = Duration::try_from_secs_f64(ms / 1000.0)
        .ok()
        .and_then(|d| Instant::now().checked_add(d));
    loop {
        if ctx.is_interrupt_requested() {
            return ctx.throw_cancellation();
        }
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => SLEEP_POLL_INTERVAL,
        };
        if remaining.is_zero() {
            return Value::invalid();
        }
        std::thread::sleep(SLEEP_POLL_INTERVAL.min(remaining));
    }
}
