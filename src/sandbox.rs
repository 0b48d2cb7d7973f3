use crate::rate_limit::{Clock, RateLimiter, SystemClock};
use crate::{Dispatcher, ExecutionResult, QuickJsWorker, SandboxLimits, Script, TerminationReason, Worker};
use parking_lot::Mutex;

/// Entry point for the collaboration layer
///
/// Pairs a [`Dispatcher`] with a per-connection [`RateLimiter`]. Safe to
/// share between connection tasks; the limiter lock is never held across
/// an execution.
pub struct Sandbox<C: Clock = SystemClock, W: Worker = QuickJsWorker> {
    dispatcher: Dispatcher<W>,
    limiter: Mutex<RateLimiter<C>>,
}

impl Sandbox<SystemClock, QuickJsWorker> {
    pub fn new(limits: SandboxLimits) -> Self {
        Self::with_parts(Dispatcher::new(limits.clone()), RateLimiter::new(&limits))
    }
}

impl Default for Sandbox<SystemClock, QuickJsWorker> {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl<C: Clock, W: Worker + 'static> Sandbox<C, W> {
    pub fn with_parts(dispatcher: Dispatcher<W>, limiter: RateLimiter<C>) -> Self {
        Self {
            dispatcher,
            limiter: Mutex::new(limiter),
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        self.dispatcher.limits()
    }

    pub fn can_execute(&self, connection_id: &str) -> bool {
        self.limiter.lock().can_execute(connection_id)
    }

    pub fn cleanup(&self, connection_id: &str) {
        self.limiter.lock().cleanup(connection_id);
    }

    /// Execute without consulting the rate limiter
    pub async fn execute(&self, script: impl Into<Script>) -> ExecutionResult {
        self.dispatcher.execute(script).await
    }

    /// Rate-limited execution on behalf of `connection_id`
    ///
    /// A denied request resolves immediately with empty output and spawns
    /// nothing.
    pub async fn run(&self, connection_id: &str, script: impl Into<Script>) -> ExecutionResult {
        if !self.can_execute(connection_id) {
            return ExecutionResult::rejected(TerminationReason::RateLimited);
        }

        self.execute(script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, ScriptedWorker};
    use std::time::Duration;

    fn sandbox(clock: &ManualClock) -> Sandbox<ManualClock, ScriptedWorker> {
        let limits = SandboxLimits {
            execution_timeout_ms: 100,
            rate_limit_max_executions: 2,
            ..Default::default()
        };
        Sandbox::with_parts(
            Dispatcher::new(limits.clone()),
            RateLimiter::with_clock(&limits, clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_run_is_rate_limited() {
        let clock = ManualClock::new();
        let sandbox = sandbox(&clock);

        assert!(sandbox.run("conn", "out 1\ndone").await.is_ok());
        assert!(sandbox.run("conn", "out 2\ndone").await.is_ok());

        let denied = sandbox.run("conn", "out 3\ndone").await;
        assert!(denied.output_lines.is_empty());
        assert_eq!(denied.reason, Some(TerminationReason::RateLimited));
        assert_eq!(
            denied.error.as_deref(),
            Some("Rate limit exceeded. Please wait a few seconds before running again.")
        );

        clock.advance(Duration::from_secs(10));
        let allowed = sandbox.run("conn", "out 4\ndone").await;
        assert_eq!(allowed.output_lines, ["4"]);
    }

    #[tokio::test]
    async fn test_cleanup_on_disconnect() {
        let clock = ManualClock::new();
        let sandbox = sandbox(&clock);

        assert!(sandbox.can_execute("conn"));
        assert!(sandbox.can_execute("conn"));
        assert!(!sandbox.can_execute("conn"));

        sandbox.cleanup("conn");
        assert!(sandbox.run("conn", "out fresh\ndone").await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_bypasses_limiter() {
        let clock = ManualClock::new();
        let sandbox = sandbox(&clock);

        for _ in 0..4 {
            assert!(sandbox.execute("done").await.is_ok());
        }
        assert!(sandbox.can_execute("conn"));
    }
}
