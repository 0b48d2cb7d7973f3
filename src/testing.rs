//! Test doubles for the sandbox
//!
//! - [`ManualClock`]: an injectable [`Clock`] that only moves when told to
//! - [`ScriptedWorker`]: a [`Worker`] driven by a line-based command script,
//!   for exercising dispatcher paths a real interpreter cannot reproduce on
//!   demand (faults, panics, hangs, late messages)
//!
//! # Usage
//!
//! ```ignore
//! use collab_sandbox::testing::{ManualClock, ScriptedWorker};
//! use collab_sandbox::{Dispatcher, RateLimiter, SandboxLimits};
//!
//! let clock = ManualClock::new();
//! let mut limiter = RateLimiter::with_clock(&SandboxLimits::default(), clock.clone());
//! clock.advance(std::time::Duration::from_secs(10));
//!
//! let dispatcher = Dispatcher::<ScriptedWorker>::new(SandboxLimits::default());
//! let result = dispatcher.execute("out hello\ndone").await;
//! ```

use crate::rate_limit::Clock;
use crate::worker::{OutputSink, Watchdog, WorkerInit};
use crate::{Script, TerminationReason, Worker};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock that stands still until advanced
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<parking_lot::Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Worker that interprets its script as one command per line
///
/// | Command | Effect |
/// |---|---|
/// | `out <line>` | emit an output line (subject to the cap) |
/// | `tick` | emit this worker's own call counter |
/// | `done` | report completion without error |
/// | `throw <msg>` | report completion with an exception |
/// | `fault <msg>` | return an isolate fault |
/// | `exit` | return without reporting completion |
/// | `panic` | unwind the isolate thread |
/// | `hang` | block until the isolate is terminated |
///
/// Running off the end of the script behaves like `exit`.
pub struct ScriptedWorker {
    script: Script,
    sink: OutputSink,
    watchdog: Arc<Watchdog>,
    ticks: u32,
}

impl Worker for ScriptedWorker {
    fn new(init: WorkerInit) -> Result<Self, TerminationReason> {
        Ok(Self {
            script: init.script,
            sink: init.sink,
            watchdog: init.watchdog,
            ticks: 0,
        })
    }

    fn exec(&mut self) -> Result<(), TerminationReason> {
        let commands: Vec<String> = self.script.code.lines().map(str::to_owned).collect();

        for command in commands {
            let (verb, arg) = command
                .split_once(' ')
                .unwrap_or((command.as_str(), ""));

            match verb {
                "out" => {
                    self.sink.push_line(arg.to_owned());
                }
                "tick" => {
                    self.ticks += 1;
                    self.sink.push_line(self.ticks.to_string());
                }
                "done" => self.sink.done(None),
                "throw" => self
                    .sink
                    .done(Some(TerminationReason::Exception(arg.to_owned()))),
                "fault" => return Err(TerminationReason::IsolateCrash(arg.to_owned())),
                "exit" => return Ok(()),
                "panic" => panic!("scripted isolate panic"),
                "hang" => {
                    while !self.watchdog.is_terminated() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    return Err(TerminationReason::Terminated);
                }
                other => panic!("unknown scripted command: {other}"),
            }
        }

        Ok(())
    }
}
