use crate::isolate::{self, IsolateHandle};
use crate::worker::IsolateMessage;
use crate::{ExecutionResult, QuickJsWorker, SandboxLimits, Script, TerminationReason, Worker};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{self, Instant};

/// Runs each submission in a fresh isolate and resolves exactly one result
///
/// Isolates are never pooled or reused. Completion is cooperative (`done`),
/// except for the hard-kill timer armed at spawn, which ends the run at
/// [`SandboxLimits::hard_kill_after`] whatever the script is doing.
pub struct Dispatcher<W: Worker = QuickJsWorker> {
    limits: SandboxLimits,
    next_isolate_id: AtomicU64,
    _worker: PhantomData<fn() -> W>,
}

impl<W: Worker + 'static> Dispatcher<W> {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            next_isolate_id: AtomicU64::new(1),
            _worker: PhantomData,
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Execute a submission
    ///
    /// Validation failures resolve immediately without spawning anything.
    pub async fn execute(&self, script: impl Into<Script>) -> ExecutionResult {
        let script = script.into();

        if let Err(reason) = script.validate(&self.limits) {
            tracing::debug!(%reason, "rejected submission");
            return ExecutionResult::rejected(reason);
        }

        let id = self.next_isolate_id.fetch_add(1, Ordering::Relaxed);
        let submitted_at = script.submitted_at;
        tracing::debug!(isolate = id, code_len = script.code.len(), "spawning isolate");

        // Armed before the thread exists so spawn latency counts against it.
        let kill_at = Instant::now() + self.limits.hard_kill_after();

        match isolate::spawn::<W>(id, script, &self.limits) {
            Ok(handle) => {
                let result = supervise(handle, kill_at).await;
                tracing::debug!(
                    isolate = id,
                    latency_ms = submitted_at.elapsed().as_millis() as u64,
                    "submission answered"
                );
                result
            }
            Err(reason) => {
                tracing::warn!(isolate = id, %reason, "failed to spawn isolate");
                ExecutionResult::rejected(reason)
            }
        }
    }
}

impl Default for Dispatcher<QuickJsWorker> {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

/// Collect output until the isolate settles or the hard-kill timer fires
///
/// The first settlement wins; the handle is dropped (and the isolate
/// terminated) on return, so nothing it sends afterwards is observed.
async fn supervise(mut handle: IsolateHandle, kill_at: Instant) -> ExecutionResult {
    let mut output = Vec::new();
    let kill_timer = time::sleep_until(kill_at);
    tokio::pin!(kill_timer);

    let reason = loop {
        tokio::select! {
            message = handle.recv() => match message {
                Some(IsolateMessage::Output(line)) => output.push(line),
                Some(IsolateMessage::Done(error)) => break error,
                Some(IsolateMessage::Fault(message)) => {
                    tracing::warn!(isolate = handle.id, %message, "isolate faulted");
                    break Some(TerminationReason::IsolateCrash(message));
                }
                Some(IsolateMessage::Exit { success: true }) => break None,
                Some(IsolateMessage::Exit { success: false }) | None => {
                    tracing::warn!(isolate = handle.id, "isolate exited without reporting completion");
                    break Some(TerminationReason::ExitFailure);
                }
            },
            _ = &mut kill_timer => {
                tracing::warn!(isolate = handle.id, lines = output.len(), "hard-kill timer fired");
                handle.terminate();
                break Some(TerminationReason::WallClockTimeout);
            }
        }
    };

    tracing::debug!(
        isolate = handle.id,
        lines = output.len(),
        error = ?reason,
        "execution resolved"
    );
    ExecutionResult::from_parts(output, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedWorker;
    use std::time::Duration;

    fn scripted(timeout_ms: u64) -> Dispatcher<ScriptedWorker> {
        Dispatcher::new(SandboxLimits {
            execution_timeout_ms: timeout_ms,
            max_code_length: 100,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_empty_code_rejected() {
        let result = scripted(100).execute("  \n ").await;
        assert_eq!(result, ExecutionResult::rejected(TerminationReason::EmptyCode));
        assert_eq!(result.error.as_deref(), Some("No code to execute"));
    }

    #[tokio::test]
    async fn test_oversized_code_rejected() {
        let result = scripted(100).execute("x".repeat(101)).await;
        assert!(result.output_lines.is_empty());
        assert_eq!(
            result.error.as_deref(),
            Some("Code exceeds maximum length of 100 characters")
        );
    }

    #[tokio::test]
    async fn test_done_resolves_with_output() {
        let result = scripted(100).execute("out a\nout b\ndone").await;
        assert_eq!(result, ExecutionResult::ok(vec!["a".into(), "b".into()]));
    }

    #[tokio::test]
    async fn test_done_carries_error() {
        let result = scripted(100).execute("out a\nthrow boom").await;
        assert_eq!(result.output_lines, ["a"]);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_messages_after_done_are_discarded() {
        let result = scripted(100).execute("out a\ndone\nout late\nfault ignored").await;
        assert_eq!(result, ExecutionResult::ok(vec!["a".into()]));
    }

    #[tokio::test]
    async fn test_fault_keeps_partial_output() {
        let result = scripted(100).execute("out partial\nfault channel closed").await;
        assert_eq!(result.output_lines, ["partial"]);
        assert_eq!(
            result.reason,
            Some(TerminationReason::IsolateCrash("channel closed".into()))
        );
        assert_eq!(result.error.as_deref(), Some("channel closed"));
    }

    #[tokio::test]
    async fn test_abnormal_exit() {
        let result = scripted(100).execute("out partial\npanic").await;
        assert_eq!(result.output_lines, ["partial"]);
        assert_eq!(result.error.as_deref(), Some("Execution failed"));
    }

    #[tokio::test]
    async fn test_clean_exit_without_done() {
        let result = scripted(100).execute("out partial\nexit").await;
        assert_eq!(result, ExecutionResult::ok(vec!["partial".into()]));
    }

    #[tokio::test]
    async fn test_hard_kill() {
        let started = std::time::Instant::now();
        let result = scripted(50).execute("out before\nhang").await;

        assert_eq!(result.output_lines, ["before"]);
        assert_eq!(result.reason, Some(TerminationReason::WallClockTimeout));
        assert_eq!(
            result.error.as_deref(),
            Some("Execution timed out (possible infinite loop or blocking code)")
        );
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_each_run_gets_fresh_isolate() {
        let dispatcher = scripted(100);
        let first = dispatcher.execute("tick\ntick\ndone").await;
        let second = dispatcher.execute("tick\ndone").await;

        assert_eq!(first.output_lines, ["1", "2"]);
        assert_eq!(second.output_lines, ["1"]);
    }
}
