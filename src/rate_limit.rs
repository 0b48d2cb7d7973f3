use crate::SandboxLimits;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Time source for rate limiting
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-connection sliding-window admission control
///
/// Each connection may start at most `max_executions` runs within any
/// `window`. Denied attempts are not recorded. State is purely in-memory and
/// lives until [`RateLimiter::cleanup`] is called for the connection.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    window: Duration,
    max_executions: usize,
    clock: C,
    history: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter<SystemClock> {
    pub fn new(limits: &SandboxLimits) -> Self {
        Self::with_clock(limits, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(limits: &SandboxLimits, clock: C) -> Self {
        Self {
            window: limits.rate_limit_window(),
            max_executions: limits.rate_limit_max_executions,
            clock,
            history: HashMap::new(),
        }
    }

    /// Admit or deny one run for `connection_id`
    ///
    /// Returns true (and records the attempt) if fewer than `max_executions`
    /// runs were admitted within the current window.
    pub fn can_execute(&mut self, connection_id: &str) -> bool {
        let now = self.clock.now();
        let window = self.window;
        let timestamps = self.history.entry(connection_id.to_owned()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_executions {
            tracing::debug!(
                connection = connection_id,
                recent = timestamps.len(),
                "rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Forget everything about `connection_id` (call on disconnect)
    pub fn cleanup(&mut self, connection_id: &str) {
        self.history.remove(connection_id);
    }

    /// Number of connections currently tracked
    pub fn tracked_connections(&self) -> usize {
        self.history.len()
    }
}
