//! Verification failure types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::script::ConfigurationError;

/// Why a verification run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// A value differed from the expected value.
    ValueMismatch,
    /// A value or error did not satisfy the expected predicate.
    PredicateMismatch,
    /// A count step saw too few values before a terminal, or one too many.
    CountMismatch { expected: u64, observed: u64 },
    /// A value arrived where a terminal signal was expected.
    UnexpectedElement,
    /// A terminal signal arrived while value steps remained.
    UnexpectedTermination,
    /// Complete arrived where an error was expected, or the reverse.
    WrongTerminalKind,
    /// The error was of a different kind than expected.
    ErrorKindMismatch,
    /// The error message differed from the expected message.
    ErrorMessageMismatch,
    /// The real-time deadline passed before the script resolved.
    Timeout { deadline: Duration },
    /// Virtual time could not advance further without a terminal signal.
    ClockExhausted { advances: u64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ValueMismatch => f.write_str("value mismatch"),
            FailureReason::PredicateMismatch => f.write_str("predicate mismatch"),
            FailureReason::CountMismatch { expected, observed } => {
                write!(f, "count mismatch (expected {expected}, observed {observed})")
            }
            FailureReason::UnexpectedElement => f.write_str("unexpected element"),
            FailureReason::UnexpectedTermination => f.write_str("unexpected termination"),
            FailureReason::WrongTerminalKind => f.write_str("wrong terminal kind"),
            FailureReason::ErrorKindMismatch => f.write_str("error kind mismatch"),
            FailureReason::ErrorMessageMismatch => f.write_str("error message mismatch"),
            FailureReason::Timeout { deadline } => write!(f, "timed out after {deadline:?}"),
            FailureReason::ClockExhausted { advances } => write!(
                f,
                "clock exhausted without terminal signal after {advances} advances"
            ),
        }
    }
}

/// A failed verification with enough context to diagnose it without re-running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    /// Zero-based index of the step being matched when the run failed.
    pub step_index: usize,
    /// The expected condition of that step.
    pub expected: String,
    /// The offending signal, if one was received.
    pub received: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expectation failed at step {}: {}; expected {}, received {}",
            self.step_index,
            self.reason,
            self.expected,
            self.received.as_deref().unwrap_or("no signal")
        )
    }
}

impl std::error::Error for Failure {}

/// Error returned by `verify`.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid verification script: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Failed(#[from] Failure),

    #[error("failed to start producer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl VerifyError {
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            VerifyError::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        self.failure().map(|failure| &failure.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_renders_full_context() {
        let failure = Failure {
            reason: FailureReason::WrongTerminalKind,
            step_index: 2,
            expected: "Complete".to_string(),
            received: Some("Error(Runtime) at 0ns".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "expectation failed at step 2: wrong terminal kind; expected Complete, \
             received Error(Runtime) at 0ns"
        );
    }

    #[test]
    fn timeout_without_signal() {
        let err = VerifyError::from(Failure {
            reason: FailureReason::Timeout {
                deadline: Duration::from_millis(50),
            },
            step_index: 0,
            expected: "Complete".to_string(),
            received: None,
        });
        assert!(err.to_string().ends_with("received no signal"));
        assert!(err.to_string().contains("timed out after 50ms"));
        assert!(matches!(err.reason(), Some(FailureReason::Timeout { .. })));
    }

    #[test]
    fn configuration_error_has_no_failure() {
        let err = VerifyError::from(ConfigurationError::EmptyScript);
        assert!(err.failure().is_none());
        assert_eq!(
            err.to_string(),
            "invalid verification script: verification script has no steps"
        );
    }
}
