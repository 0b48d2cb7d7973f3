use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The hard-kill timer fires at this multiple of the execution timeout.
pub const HARD_KILL_MULTIPLIER: u32 = 3;

/// Sandbox limits configuration
///
/// Read-only for the lifetime of the process. Missing keys fall back to the
/// defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Maximum submission length in characters (default: 10000)
    pub max_code_length: usize,
    /// Cooperative interpreter budget in milliseconds (default: 1000)
    /// Also the event-loop deadline, and the basis of the hard-kill bound.
    pub execution_timeout_ms: u64,
    /// Maximum number of output lines kept per run (default: 100)
    pub max_output_lines: usize,
    /// Rate limit sliding window in milliseconds (default: 10s)
    pub rate_limit_window_ms: u64,
    /// Runs allowed per connection within one window (default: 5)
    pub rate_limit_max_executions: usize,
    /// Maximum interpreter heap size in MB (default: 64MB)
    pub heap_max_mb: usize,
    /// Maximum interpreter stack size in KB (default: 1MB)
    pub max_stack_kb: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_code_length: 10_000,
            execution_timeout_ms: 1_000,
            max_output_lines: 100,
            rate_limit_window_ms: 10_000,
            rate_limit_max_executions: 5,
            heap_max_mb: 64,
            max_stack_kb: 1_024,
        }
    }
}

impl SandboxLimits {
    /// Parse limits from a (possibly partial) JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Wall-clock bound after which the dispatcher kills the isolate
    pub fn hard_kill_after(&self) -> Duration {
        self.execution_timeout() * HARD_KILL_MULTIPLIER
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub(crate) fn heap_max_bytes(&self) -> usize {
        self.heap_max_mb * 1024 * 1024
    }

    pub(crate) fn max_stack_bytes(&self) -> usize {
        self.max_stack_kb * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.max_code_length, 10_000);
        assert_eq!(limits.execution_timeout(), Duration::from_secs(1));
        assert_eq!(limits.hard_kill_after(), Duration::from_secs(3));
        assert_eq!(limits.max_output_lines, 100);
        assert_eq!(limits.rate_limit_window(), Duration::from_secs(10));
        assert_eq!(limits.rate_limit_max_executions, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let limits =
            SandboxLimits::from_json(r#"{"execution_timeout_ms": 250, "max_output_lines": 3}"#)
                .expect("valid config");

        assert_eq!(limits.execution_timeout_ms, 250);
        assert_eq!(limits.max_output_lines, 3);
        assert_eq!(limits.max_code_length, 10_000);
        assert_eq!(limits.hard_kill_after(), Duration::from_millis(750));
    }

    #[test]
    fn test_invalid_json() {
        assert!(SandboxLimits::from_json(r#"{"max_output_lines": "many"}"#).is_err());
    }
}
