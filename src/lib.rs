//! Sandboxed execution of untrusted JavaScript submissions
//!
//! Each submission runs in its own QuickJS isolate on a dedicated thread,
//! under a cooperative interpreter budget, a bounded event-loop simulation
//! and a hard wall-clock kill. Per-connection rate limiting gates how often
//! a connection may run code.

mod dispatcher;
mod isolate;
mod limits;
mod log;
mod rate_limit;
mod result;
mod runtime;
mod sandbox;
mod script;
mod termination;
mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatcher::Dispatcher;
pub use isolate::{IsolateHandle, spawn};
pub use limits::{HARD_KILL_MULTIPLIER, SandboxLimits};
pub use log::LogLevel;
pub use rate_limit::{Clock, RateLimiter, SystemClock};
pub use result::ExecutionResult;
pub use runtime::{DeferredEntry, EventQueues, MAX_EVENT_LOOP_ROUNDS, QuickJsWorker, TimerEntry};
pub use sandbox::Sandbox;
pub use script::Script;
pub use termination::TerminationReason;
pub use worker::{
    IsolateMessage, MessageReceiver, MessageSender, OutputSink, Watchdog, Worker, WorkerInit,
};
