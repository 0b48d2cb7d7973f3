//! Host surface installed into every sandbox context

use super::queues::EventQueues;
use crate::LogLevel;
use crate::worker::OutputSink;
use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Object, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// A JS function plus the extra arguments it was scheduled with
pub(crate) struct Callback<'js> {
    pub function: Function<'js>,
    pub args: Vec<Value<'js>>,
}

pub(crate) type SharedQueues<'js> = Rc<RefCell<EventQueues<Callback<'js>>>>;

/// Evaluated after the host functions and before the submission.
///
/// Wraps the console sinks with argument formatting, installs
/// `queueMicrotask`, shuts every path to runtime code generation and
/// evaluates to the value formatter.
///
/// Formatting lives in script so its fallbacks use `try`/`catch`, which
/// never catches the interpreter's interrupt.
const PRELUDE: &str = r#"
(() => {
  'use strict';
  const format = (value) => {
    if (typeof value === 'string') {
      return value;
    }
    if (value !== null && typeof value === 'object') {
      try {
        const json = JSON.stringify(value);
        if (json !== undefined) {
          return json;
        }
      } catch {}
    }
    try {
      return String(value);
    } catch {
      return '[unprintable value]';
    }
  };

  for (const method of ['log', 'info', 'warn', 'error']) {
    const emit = console[method];
    console[method] = function (...args) {
      emit(args.map(format).join(' '));
    };
  }

  const settled = Promise.resolve();
  const report = console.error;

  globalThis.queueMicrotask = function queueMicrotask(callback) {
    if (typeof callback !== 'function') {
      throw new TypeError('Argument must be a function');
    }
    settled.then(() => {
      try {
        callback();
      } catch (err) {
        report(err instanceof Error ? err.message : err);
      }
    });
  };

  const blocked = function Function() {
    throw new EvalError('Code generation from strings is disabled');
  };
  blocked.prototype = Function.prototype;

  const constructors = [
    Function,
    Object.getPrototypeOf(async function () {}).constructor,
    Object.getPrototypeOf(function* () {}).constructor,
    Object.getPrototypeOf(async function* () {}).constructor,
  ];
  const sealed = { value: blocked, writable: false, configurable: false };
  for (const ctor of constructors) {
    Object.defineProperty(ctor.prototype, 'constructor', sealed);
  }
  Object.defineProperty(globalThis, 'Function', sealed);
  Object.defineProperty(globalThis, 'eval', sealed);

  return format;
})();
"#;

/// The sandbox console's value formatter, kept out of script reach
pub(crate) struct Formatter<'js>(Function<'js>);

impl<'js> Formatter<'js> {
    /// Render one value the way the sandbox console prints it
    ///
    /// Errors only when the interpreter refuses to run script, such as after
    /// an interrupt.
    pub fn format(&self, value: Value<'js>) -> rquickjs::Result<String> {
        self.0.call((value,))
    }

    /// Message for an error raised while running script code
    ///
    /// Leaves the context without a pending exception. Callers check the
    /// watchdog afterwards, so an interrupt consumed here is not lost.
    pub fn describe_error(&self, ctx: &Ctx<'js>, err: rquickjs::Error) -> String {
        if !err.is_exception() {
            return err.to_string();
        }

        let caught = ctx.catch();
        if let Some(message) = caught.as_exception().and_then(|e| e.message()) {
            return message;
        }

        self.format(caught).unwrap_or_else(|_| {
            let _ = ctx.catch();
            "[unprintable value]".into()
        })
    }
}

pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    queues: &SharedQueues<'js>,
    sink: &Rc<OutputSink>,
) -> rquickjs::Result<Formatter<'js>> {
    install_console(ctx, sink)?;
    install_timers(ctx, queues)?;
    ctx.eval::<Function<'js>, _>(PRELUDE).map(Formatter)
}

fn install_console<'js>(ctx: &Ctx<'js>, sink: &Rc<OutputSink>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;

    for level in LogLevel::ALL {
        let sink = sink.clone();
        console.set(
            level.method(),
            Function::new(ctx.clone(), move |line: String| {
                sink.push_line(level.format_line(&line));
            })?,
        )?;
    }

    ctx.globals().set("console", console)
}

fn install_timers<'js>(ctx: &Ctx<'js>, queues: &SharedQueues<'js>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    // Intervals fire once: they are scheduled exactly like timeouts.
    for name in ["setTimeout", "setInterval"] {
        let queues = queues.clone();
        globals.set(
            name,
            Function::new(
                ctx.clone(),
                move |callback: Opt<Value<'js>>,
                      delay: Opt<Value<'js>>,
                      args: Rest<Value<'js>>|
                      -> rquickjs::Result<Option<u32>> {
                    let Some(function) = callback.0.and_then(Value::into_function) else {
                        return Ok(None);
                    };
                    let delay = match delay.0 {
                        Some(delay) if !delay.is_undefined() => {
                            let Coerced(delay) = delay.get::<Coerced<f64>>()?;
                            delay
                        }
                        _ => 0.0,
                    };

                    let task = Callback {
                        function,
                        args: args.0,
                    };
                    Ok(Some(queues.borrow_mut().schedule_timer(delay, task)))
                },
            )?,
        )?;
    }

    for name in ["clearTimeout", "clearInterval"] {
        let queues = queues.clone();
        globals.set(
            name,
            Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
                if let Some(id) = id.0.as_ref().and_then(handle_id) {
                    queues.borrow_mut().cancel_timer(id);
                }
            })?,
        )?;
    }

    let deferred = queues.clone();
    globals.set(
        "setImmediate",
        Function::new(
            ctx.clone(),
            move |callback: Opt<Value<'js>>, args: Rest<Value<'js>>| -> Option<u32> {
                let function = callback.0.and_then(Value::into_function)?;
                let task = Callback {
                    function,
                    args: args.0,
                };
                Some(deferred.borrow_mut().schedule_deferred(task))
            },
        )?,
    )?;

    let deferred = queues.clone();
    globals.set(
        "clearImmediate",
        Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
            if let Some(id) = id.0.as_ref().and_then(handle_id) {
                deferred.borrow_mut().cancel_deferred(id);
            }
        })?,
    )?;

    Ok(())
}

/// Timer handle passed back from script, if it can name one
fn handle_id(value: &Value<'_>) -> Option<u32> {
    if let Some(id) = value.as_int() {
        return u32::try_from(id).ok();
    }

    value
        .as_float()
        .filter(|id| id.fract() == 0.0 && *id >= 0.0 && *id <= f64::from(u32::MAX))
        .map(|id| id as u32)
}
