use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason why a submission did not complete cleanly
///
/// Carried as the `error` of an [`ExecutionResult`](crate::ExecutionResult).
/// Errors thrown inside timer or deferred callbacks are not terminations:
/// they surface as `[ERROR]` output lines and execution continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TerminationReason {
    // === Validation (no isolate spawned) ===
    /// Submission was empty or whitespace-only
    #[error("No code to execute")]
    EmptyCode,

    /// Submission exceeded the configured length
    #[error("Code exceeds maximum length of {limit} characters")]
    CodeTooLong { limit: usize },

    // === JS errors (userland) ===
    /// Synchronous evaluation threw (syntax error, throw, etc.)
    #[error("{0}")]
    Exception(String),

    /// Synchronous evaluation exceeded the interpreter's own budget
    #[error("Script execution timed out after {budget_ms}ms")]
    ScriptTimeout { budget_ms: u64 },

    // === Dispatcher-side ===
    /// Hard-kill timer fired before the isolate reported completion
    #[error("Execution timed out (possible infinite loop or blocking code)")]
    WallClockTimeout,

    /// Isolate channel or thread fault
    #[error("{0}")]
    IsolateCrash(String),

    /// Isolate exited abnormally without reporting completion
    #[error("Execution failed")]
    ExitFailure,

    /// Connection exceeded its execution quota
    #[error("Rate limit exceeded. Please wait a few seconds before running again.")]
    RateLimited,

    /// Isolate observed the kill flag and unwound
    #[error("Isolate was terminated")]
    Terminated,
}

impl TerminationReason {
    /// Returns true if the submission was rejected before any isolate ran
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::EmptyCode | Self::CodeTooLong { .. })
    }

    /// Returns true if this represents a time or quota limit violation
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(
            self,
            Self::ScriptTimeout { .. } | Self::WallClockTimeout | Self::RateLimited
        )
    }

    /// Returns true if this is a JS userland error
    pub fn is_js_error(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Returns true if this is a runtime (Rust-side) error
    pub fn is_runtime_error(&self) -> bool {
        matches!(
            self,
            Self::IsolateCrash(_) | Self::ExitFailure | Self::Terminated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(TerminationReason::EmptyCode.to_string(), "No code to execute");
        assert_eq!(
            TerminationReason::CodeTooLong { limit: 10_000 }.to_string(),
            "Code exceeds maximum length of 10000 characters"
        );
        assert_eq!(
            TerminationReason::ScriptTimeout { budget_ms: 1000 }.to_string(),
            "Script execution timed out after 1000ms"
        );
        assert_eq!(
            TerminationReason::Exception("boom".into()).to_string(),
            "boom"
        );
        assert_eq!(TerminationReason::ExitFailure.to_string(), "Execution failed");
    }

    #[test]
    fn test_classification() {
        assert!(TerminationReason::EmptyCode.is_validation_error());
        assert!(TerminationReason::WallClockTimeout.is_limit_exceeded());
        assert!(TerminationReason::RateLimited.is_limit_exceeded());
        assert!(TerminationReason::Exception("x".into()).is_js_error());
        assert!(TerminationReason::IsolateCrash("x".into()).is_runtime_error());
        assert!(!TerminationReason::WallClockTimeout.is_runtime_error());
    }
}
