use crate::{SandboxLimits, Script, TerminationReason};
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Messages an isolate sends to its dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum IsolateMessage {
    /// One console line
    Output(String),
    /// Run finished, with the synchronous error if there was one
    Done(Option<TerminationReason>),
    /// Isolate-level fault (the worker could not be built or driven)
    Fault(String),
    /// Isolate thread exited; `success` is false when it unwound from a panic
    Exit { success: bool },
}

/// Type alias for isolate message sender
pub type MessageSender = mpsc::UnboundedSender<IsolateMessage>;

/// Type alias for isolate message receiver
pub type MessageReceiver = mpsc::UnboundedReceiver<IsolateMessage>;

/// Capped line sink owned by one isolate
///
/// Lines past `max_lines` are dropped silently; the counter only counts
/// forwarded lines.
#[derive(Debug)]
pub struct OutputSink {
    tx: MessageSender,
    emitted: Cell<usize>,
    max_lines: usize,
}

impl OutputSink {
    pub fn new(tx: MessageSender, max_lines: usize) -> Self {
        Self {
            tx,
            emitted: Cell::new(0),
            max_lines,
        }
    }

    /// Forward a line if the cap allows it. Returns whether it was forwarded.
    pub fn push_line(&self, line: String) -> bool {
        let emitted = self.emitted.get();
        if emitted >= self.max_lines {
            return false;
        }

        self.emitted.set(emitted + 1);
        tracing::trace!(target: "collab_sandbox::console", "{line}");

        // The dispatcher may already have resolved; late lines are discarded.
        let _ = self.tx.send(IsolateMessage::Output(line));
        true
    }

    /// Report completion
    pub fn done(&self, error: Option<TerminationReason>) {
        let _ = self.tx.send(IsolateMessage::Done(error));
    }

    pub fn emitted(&self) -> usize {
        self.emitted.get()
    }
}

/// Interrupt state shared between a dispatcher and the isolate it spawned
///
/// The interpreter polls [`Watchdog::should_interrupt`] while running script
/// code. Termination is sticky; the cooperative budget is armed only while
/// synchronous evaluation runs.
#[derive(Debug)]
pub struct Watchdog {
    origin: Instant,
    terminated: AtomicBool,
    /// Nanoseconds after `origin`; 0 means disarmed
    budget_deadline: AtomicU64,
    budget_exceeded: AtomicBool,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            terminated: AtomicBool::new(false),
            budget_deadline: AtomicU64::new(0),
            budget_exceeded: AtomicBool::new(false),
        }
    }

    /// Hard kill: every subsequent interrupt check fires
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Start the cooperative budget, counting from now
    pub fn arm_budget(&self, budget: Duration) {
        let deadline = (self.origin.elapsed() + budget).as_nanos().max(1);
        let deadline = u64::try_from(deadline).unwrap_or(u64::MAX);
        self.budget_deadline.store(deadline, Ordering::SeqCst);
    }

    pub fn disarm_budget(&self) {
        self.budget_deadline.store(0, Ordering::SeqCst);
    }

    /// True once an armed budget has expired during an interrupt check
    pub fn budget_exceeded(&self) -> bool {
        self.budget_exceeded.load(Ordering::SeqCst)
    }

    pub fn should_interrupt(&self) -> bool {
        if self.is_terminated() {
            return true;
        }

        let deadline = self.budget_deadline.load(Ordering::SeqCst);
        if deadline != 0 && self.origin.elapsed().as_nanos() >= u128::from(deadline) {
            self.budget_exceeded.store(true, Ordering::SeqCst);
            return true;
        }

        false
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker is handed when its isolate thread starts
pub struct WorkerInit {
    pub script: Script,
    pub sink: OutputSink,
    pub limits: SandboxLimits,
    pub watchdog: Arc<Watchdog>,
}

/// Common trait for sandboxed script evaluators
///
/// A worker is built and driven on its own isolate thread, so it does not
/// need to be `Send`. It owns the sink and must report completion with
/// [`OutputSink::done`]; returning `Err` instead reports an isolate fault.
pub trait Worker: Sized {
    /// Create a new worker for one submission
    fn new(init: WorkerInit) -> Result<Self, TerminationReason>;

    /// Run the submission to completion
    ///
    /// Returns:
    /// - `Ok(())` once `done` has been reported
    /// - `Err(TerminationReason)` if the isolate itself failed
    fn exec(&mut self) -> Result<(), TerminationReason>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_caps_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = OutputSink::new(tx, 2);

        assert!(sink.push_line("a".into()));
        assert!(sink.push_line("b".into()));
        assert!(!sink.push_line("c".into()));
        assert_eq!(sink.emitted(), 2);
        sink.done(None);

        assert_eq!(rx.try_recv().unwrap(), IsolateMessage::Output("a".into()));
        assert_eq!(rx.try_recv().unwrap(), IsolateMessage::Output("b".into()));
        assert_eq!(rx.try_recv().unwrap(), IsolateMessage::Done(None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = OutputSink::new(tx, 1);

        assert!(sink.push_line("lost".into()));
        sink.done(None);
    }

    #[test]
    fn test_watchdog_budget() {
        let watchdog = Watchdog::new();
        assert!(!watchdog.should_interrupt());

        watchdog.arm_budget(Duration::ZERO);
        assert!(watchdog.should_interrupt());
        assert!(watchdog.budget_exceeded());

        watchdog.disarm_budget();
        assert!(!watchdog.should_interrupt());
    }

    #[test]
    fn test_watchdog_terminate_is_sticky() {
        let watchdog = Watchdog::new();
        watchdog.arm_budget(Duration::from_secs(60));
        assert!(!watchdog.should_interrupt());

        watchdog.terminate();
        assert!(watchdog.should_interrupt());
        watchdog.disarm_budget();
        assert!(watchdog.should_interrupt());
        assert!(!watchdog.budget_exceeded());
    }
}
