use crate::TerminationReason;
use serde::{Deserialize, Serialize};

/// Outcome of one execution request
///
/// Exactly one is produced per request. Serializes as
/// `{"output": [...], "error": string | null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured output lines, in emission order
    #[serde(rename = "output")]
    pub output_lines: Vec<String>,
    /// Error message, if the run did not complete cleanly
    pub error: Option<String>,
    /// Classified reason behind `error` (not part of the wire shape)
    #[serde(skip)]
    pub reason: Option<TerminationReason>,
}

impl ExecutionResult {
    /// Create a result for a run that completed without error
    pub fn ok(output_lines: Vec<String>) -> Self {
        Self {
            output_lines,
            error: None,
            reason: None,
        }
    }

    /// Create a result for a run that ended with `reason`, keeping partial output
    pub fn failed(output_lines: Vec<String>, reason: TerminationReason) -> Self {
        Self {
            output_lines,
            error: Some(reason.to_string()),
            reason: Some(reason),
        }
    }

    /// Create a result for a request rejected before any isolate ran
    pub fn rejected(reason: TerminationReason) -> Self {
        Self::failed(Vec::new(), reason)
    }

    /// Create a result from output plus an optional error
    pub fn from_parts(output_lines: Vec<String>, reason: Option<TerminationReason>) -> Self {
        match reason {
            Some(reason) => Self::failed(output_lines, reason),
            None => Self::ok(output_lines),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let result = ExecutionResult::failed(
            vec!["1".into(), "2".into()],
            TerminationReason::WallClockTimeout,
        );

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "output": ["1", "2"],
                "error": "Execution timed out (possible infinite loop or blocking code)"
            })
        );
    }

    #[test]
    fn test_ok_serializes_null_error() {
        let result = ExecutionResult::ok(vec!["hello".into()]);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "output": ["hello"], "error": null })
        );
    }

    #[test]
    fn test_rejected_has_no_output() {
        let result = ExecutionResult::rejected(TerminationReason::EmptyCode);
        assert!(result.output_lines.is_empty());
        assert_eq!(result.error.as_deref(), Some("No code to execute"));
        assert_eq!(result.reason, Some(TerminationReason::EmptyCode));
    }
}
