use crate::{SandboxLimits, TerminationReason};
use std::time::Instant;

/// A submission to run: JavaScript source plus the time it was received
///
/// One `Script` backs exactly one execution and is consumed by it.
#[derive(Debug, Clone)]
pub struct Script {
    pub code: String,
    pub submitted_at: Instant,
}

impl Script {
    /// Create a new script submitted now
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            submitted_at: Instant::now(),
        }
    }

    /// Length in characters, as the length limit counts it
    ///
    /// Counts Unicode scalar values, so a character outside the Basic
    /// Multilingual Plane counts once rather than as two UTF-16 units.
    pub fn char_len(&self) -> usize {
        self.code.chars().count()
    }

    /// Check the submission against the validation rules
    ///
    /// Returns the rejection reason for empty/whitespace-only code or code
    /// longer than `max_code_length`.
    pub fn validate(&self, limits: &SandboxLimits) -> Result<(), TerminationReason> {
        if self.code.trim().is_empty() {
            return Err(TerminationReason::EmptyCode);
        }

        if self.char_len() > limits.max_code_length {
            return Err(TerminationReason::CodeTooLong {
                limit: limits.max_code_length,
            });
        }

        Ok(())
    }
}

impl From<String> for Script {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for Script {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_code() {
        let limits = SandboxLimits::default();
        for code in ["", "   ", "\n\t  \r\n"] {
            assert_eq!(
                Script::new(code).validate(&limits),
                Err(TerminationReason::EmptyCode)
            );
        }
    }

    #[test]
    fn test_length_limit_is_inclusive() {
        let limits = SandboxLimits {
            max_code_length: 8,
            ..Default::default()
        };

        assert!(Script::new("log(123)").validate(&limits).is_ok());
        assert_eq!(
            Script::new("log(1234)").validate(&limits),
            Err(TerminationReason::CodeTooLong { limit: 8 })
        );
    }

    #[test]
    fn test_length_counts_characters() {
        let limits = SandboxLimits {
            max_code_length: 4,
            ..Default::default()
        };

        // 4 characters, 8 bytes
        assert!(Script::new("ééàà").validate(&limits).is_ok());
    }
}
