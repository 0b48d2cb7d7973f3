//! QuickJS-backed isolate
//!
//! Runs one submission through three phases on the isolate thread:
//!
//! 1. synchronous evaluation under the interpreter's cooperative budget
//! 2. one microtask drain
//! 3. a bounded event-loop simulation over deferred callbacks and timers
//!
//! A synchronous throw reports the error immediately and skips phases 2-3.

mod globals;
mod queues;

pub use queues::{DeferredEntry, EventQueues, TimerEntry};

use crate::worker::{OutputSink, Watchdog, WorkerInit};
use crate::{LogLevel, SandboxLimits, Script, TerminationReason, Worker};
use globals::{Callback, Formatter, SharedQueues};
use rquickjs::function::Args;
use rquickjs::{Context, Ctx, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// Upper bound on event-loop rounds per run
pub const MAX_EVENT_LOOP_ROUNDS: usize = 500;

pub struct QuickJsWorker {
    script: Script,
    sink: Rc<OutputSink>,
    limits: SandboxLimits,
    watchdog: Arc<Watchdog>,
    // Context must drop before its runtime
    context: Context,
    _runtime: Runtime,
}

impl Worker for QuickJsWorker {
    fn new(init: WorkerInit) -> Result<Self, TerminationReason> {
        let WorkerInit {
            script,
            sink,
            limits,
            watchdog,
        } = init;

        let runtime = Runtime::new().map_err(|e| {
            TerminationReason::IsolateCrash(format!("Failed to create QuickJS runtime: {e}"))
        })?;
        runtime.set_memory_limit(limits.heap_max_bytes());
        runtime.set_max_stack_size(limits.max_stack_bytes());

        let interrupt = watchdog.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.should_interrupt())));

        let context = Context::full(&runtime).map_err(|e| {
            TerminationReason::IsolateCrash(format!("Failed to create QuickJS context: {e}"))
        })?;

        Ok(Self {
            script,
            sink: Rc::new(sink),
            limits,
            watchdog,
            context,
            _runtime: runtime,
        })
    }

    fn exec(&mut self) -> Result<(), TerminationReason> {
        let error = self.context.with(|ctx| self.run(&ctx))?;

        tracing::debug!(
            lines = self.sink.emitted(),
            error = ?error,
            "isolate finished"
        );
        self.sink.done(error);
        Ok(())
    }
}

impl QuickJsWorker {
    /// Returns the error to report with `done`
    fn run<'js>(&self, ctx: &Ctx<'js>) -> Result<Option<TerminationReason>, TerminationReason> {
        let queues: SharedQueues<'js> = Rc::new(RefCell::new(EventQueues::new()));
        let _clear = ClearQueues(&queues);

        let formatter = globals::install(ctx, &queues, &self.sink).map_err(|e| {
            let detail = if e.is_exception() {
                format!("{:?}", ctx.catch())
            } else {
                e.to_string()
            };
            TerminationReason::IsolateCrash(format!("Failed to install sandbox globals: {detail}"))
        })?;

        self.watchdog.arm_budget(self.limits.execution_timeout());
        let evaluated = ctx.eval::<(), _>(self.script.code.as_str());
        self.watchdog.disarm_budget();

        if let Err(err) = evaluated {
            let message = formatter.describe_error(ctx, err);
            if self.watchdog.is_terminated() {
                return Err(TerminationReason::Terminated);
            }
            if self.watchdog.budget_exceeded() {
                return Ok(Some(TerminationReason::ScriptTimeout {
                    budget_ms: self.limits.execution_timeout_ms,
                }));
            }
            return Ok(Some(TerminationReason::Exception(message)));
        }

        self.drain_microtasks(ctx)?;
        self.event_loop(ctx, &queues, &formatter)?;
        Ok(None)
    }

    /// Process deferred callbacks and timers until the deadline, the round
    /// cap, or a round with nothing to run
    fn event_loop<'js>(
        &self,
        ctx: &Ctx<'js>,
        queues: &SharedQueues<'js>,
        formatter: &Formatter<'js>,
    ) -> Result<(), TerminationReason> {
        let deadline = Instant::now() + self.limits.execution_timeout();
        let mut rounds = 0;

        while rounds < MAX_EVENT_LOOP_ROUNDS && Instant::now() < deadline {
            rounds += 1;
            let mut did_work = false;

            // Entries queued by this batch wait for the next round.
            let batch = queues.borrow().deferred_len();
            for _ in 0..batch {
                let entry = queues.borrow_mut().pop_deferred();
                let Some(entry) = entry else { break };
                if entry.cancelled {
                    continue;
                }
                self.invoke(ctx, formatter, entry.task)?;
                did_work = true;
            }

            if Instant::now() < deadline {
                let timer = queues.borrow_mut().pop_next_timer();
                if let Some(timer) = timer {
                    self.invoke(ctx, formatter, timer.task)?;
                    did_work = true;
                }
            }

            if !did_work {
                break;
            }
        }

        tracing::trace!(rounds, "event loop finished");
        Ok(())
    }

    /// Run one callback, report its error as an output line, then flush microtasks
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        formatter: &Formatter<'js>,
        callback: Callback<'js>,
    ) -> Result<(), TerminationReason> {
        if let Err(err) = call(ctx, callback) {
            let message = formatter.describe_error(ctx, err);
            if self.watchdog.is_terminated() {
                return Err(TerminationReason::Terminated);
            }
            self.sink.push_line(LogLevel::Error.format_line(&message));
        }

        self.drain_microtasks(ctx)
    }

    fn drain_microtasks(&self, ctx: &Ctx<'_>) -> Result<(), TerminationReason> {
        while ctx.execute_pending_job() {
            if self.watchdog.is_terminated() {
                return Err(TerminationReason::Terminated);
            }
        }

        if self.watchdog.is_terminated() {
            return Err(TerminationReason::Terminated);
        }
        Ok(())
    }
}

fn call<'js>(ctx: &Ctx<'js>, callback: Callback<'js>) -> rquickjs::Result<Value<'js>> {
    let Callback { function, args } = callback;

    let mut js_args = Args::new(ctx.clone(), args.len());
    for arg in args {
        js_args.push_arg(arg)?;
    }
    function.call_arg(js_args)
}

/// Drops every queued JS value before the context goes away, including on
/// unwind, so the runtime is never freed with live references.
struct ClearQueues<'a, 'js>(&'a SharedQueues<'js>);

impl Drop for ClearQueues<'_, '_> {
    fn drop(&mut self) {
        if let Ok(mut queues) = self.0.try_borrow_mut() {
            queues.clear();
        }
    }
}
