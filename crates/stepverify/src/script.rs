//! Verification scripts: ordered expectation steps.
//!
//! A script is a sequence of non-terminal steps (values, predicates, counts)
//! closed by exactly one terminal step (completion, an error expectation, or
//! cancellation). Order is the contract: signals are matched against steps in
//! declared order and no step is skipped.

use std::fmt::{self, Debug};
use std::time::Duration;

use thiserror::Error;

use crate::signal::ProducerError;

pub type ValuePredicate<T> = Box<dyn Fn(&T) -> bool>;
pub type ErrorPredicate = Box<dyn Fn(&ProducerError) -> bool>;

/// One expectation in a verification script.
pub enum ExpectationStep<T> {
    /// Next signal carries exactly this value.
    ExpectValue(T),
    /// Next signal's value satisfies the predicate.
    ExpectPredicate {
        description: String,
        predicate: ValuePredicate<T>,
    },
    /// The next `n` signals are values, whatever they are.
    ExpectCount(u64),
    /// Terminates with an error of this kind.
    ExpectErrorKind(String),
    /// Terminates with an error whose detail equals this text.
    ExpectErrorMessage(String),
    /// Terminates with an error satisfying the predicate.
    ExpectErrorPredicate {
        description: String,
        predicate: ErrorPredicate,
    },
    /// Terminates normally.
    ExpectCompletion,
    /// Cancels the subscription once every preceding step has matched.
    ThenCancel,
}

impl<T> ExpectationStep<T> {
    /// Returns true for steps that must close a script.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExpectationStep::ExpectErrorKind(_)
                | ExpectationStep::ExpectErrorMessage(_)
                | ExpectationStep::ExpectErrorPredicate { .. }
                | ExpectationStep::ExpectCompletion
                | ExpectationStep::ThenCancel
        )
    }
}

impl<T: Debug> ExpectationStep<T> {
    /// Human-readable form of the expected condition.
    pub fn describe(&self) -> String {
        match self {
            ExpectationStep::ExpectValue(value) => format!("Next({value:?})"),
            ExpectationStep::ExpectPredicate { description, .. } => {
                format!("Next matching {description}")
            }
            ExpectationStep::ExpectCount(n) => format!("{n} Next signals"),
            ExpectationStep::ExpectErrorKind(kind) => format!("Error of kind {kind}"),
            ExpectationStep::ExpectErrorMessage(message) => {
                format!("Error with message {message:?}")
            }
            ExpectationStep::ExpectErrorPredicate { description, .. } => {
                format!("Error matching {description}")
            }
            ExpectationStep::ExpectCompletion => "Complete".to_string(),
            ExpectationStep::ThenCancel => "cancellation".to_string(),
        }
    }
}

impl<T: Debug> Debug for ExpectationStep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A script that is malformed before any signal is seen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("verification script has no steps")]
    EmptyScript,

    #[error("verification script must end with a terminal step, but step {index} is {step}")]
    MissingTerminal { index: usize, step: String },

    #[error("step {index} ({step}) follows terminal step {terminal_index}")]
    StepAfterTerminal {
        index: usize,
        step: String,
        terminal_index: usize,
    },

    #[error("expect_next at step {index} was given no values")]
    EmptyExpectNext { index: usize },

    #[error("virtual-time advance budget must be positive")]
    ZeroAdvanceBudget,

    #[error("verification deadline must be positive")]
    ZeroDeadline,

    /// Virtual-time runs are bounded by their advance budget alone.
    #[error("a wall-clock deadline does not apply to virtual-time verification")]
    DeadlineInVirtualTime,
}

/// Validated, immutable sequence of expectation steps.
///
/// Consumed by exactly one verification run.
pub struct VerificationScript<T> {
    steps: Vec<ExpectationStep<T>>,
    deadline: Option<Duration>,
    initial_offset: Option<Duration>,
}

impl<T: Debug> VerificationScript<T> {
    /// Validates the shape of `steps`.
    pub fn new(steps: Vec<ExpectationStep<T>>) -> Result<Self, ConfigurationError> {
        let Some(last) = steps.last() else {
            return Err(ConfigurationError::EmptyScript);
        };

        if let Some(terminal_index) = steps.iter().position(ExpectationStep::is_terminal) {
            if terminal_index + 1 < steps.len() {
                let index = terminal_index + 1;
                return Err(ConfigurationError::StepAfterTerminal {
                    index,
                    step: steps[index].describe(),
                    terminal_index,
                });
            }
        } else {
            return Err(ConfigurationError::MissingTerminal {
                index: steps.len() - 1,
                step: last.describe(),
            });
        }

        Ok(Self {
            steps,
            deadline: None,
            initial_offset: None,
        })
    }

    /// Overall deadline for real-time runs.
    pub fn with_deadline(mut self, deadline: Duration) -> Result<Self, ConfigurationError> {
        if deadline.is_zero() {
            return Err(ConfigurationError::ZeroDeadline);
        }
        self.deadline = Some(deadline);
        Ok(self)
    }

    /// Virtual time at which a virtual-time run starts.
    pub fn with_initial_offset(mut self, offset: Duration) -> Self {
        self.initial_offset = Some(offset);
        self
    }
}

impl<T> VerificationScript<T> {
    pub fn steps(&self) -> &[ExpectationStep<T>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn initial_offset(&self) -> Option<Duration> {
        self.initial_offset
    }

    pub(crate) fn into_steps(self) -> Vec<ExpectationStep<T>> {
        self.steps
    }
}

impl<T: Debug> Debug for VerificationScript<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationScript")
            .field("steps", &self.steps)
            .field("deadline", &self.deadline)
            .field("initial_offset", &self.initial_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    type Step = ExpectationStep<&'static str>;

    #[test]
    fn accepts_values_then_completion() {
        let script = VerificationScript::new(vec![
            Step::ExpectValue("foo"),
            Step::ExpectValue("bar"),
            Step::ExpectCompletion,
        ])
        .unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script.deadline(), None);
    }

    #[test]
    fn rejects_empty_script() {
        assert_eq!(
            VerificationScript::<u8>::new(Vec::new()).unwrap_err(),
            ConfigurationError::EmptyScript
        );
    }

    #[test]
    fn rejects_missing_terminal() {
        let err =
            VerificationScript::new(vec![Step::ExpectValue("foo"), Step::ExpectCount(2)]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingTerminal {
                index: 1,
                step: "2 Next signals".to_string(),
            }
        );
    }

    #[test]
    fn rejects_step_after_terminal() {
        let err = VerificationScript::new(vec![
            Step::ExpectCompletion,
            Step::ExpectValue("late"),
            Step::ExpectCompletion,
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::StepAfterTerminal {
                index: 1,
                step: "Next(\"late\")".to_string(),
                terminal_index: 0,
            }
        );
        assert_eq!(
            err.to_string(),
            "step 1 (Next(\"late\")) follows terminal step 0"
        );
    }

    #[test]
    fn rejects_zero_deadline() {
        let script = VerificationScript::new(vec![Step::ExpectCompletion]).unwrap();
        assert_eq!(
            script.with_deadline(Duration::ZERO).unwrap_err(),
            ConfigurationError::ZeroDeadline
        );
    }

    #[test_case(Step::ExpectCompletion => true; "completion")]
    #[test_case(Step::ExpectErrorKind("Runtime".into()) => true; "error kind")]
    #[test_case(Step::ExpectErrorMessage("boom".into()) => true; "error message")]
    #[test_case(Step::ThenCancel => true; "cancel")]
    #[test_case(Step::ExpectValue("foo") => false; "value")]
    #[test_case(Step::ExpectCount(3) => false; "count")]
    fn terminal_steps(step: Step) -> bool {
        step.is_terminal()
    }

    #[test]
    fn predicate_description_is_rendered() {
        let step: Step = ExpectationStep::ExpectPredicate {
            description: "username == swhite".to_string(),
            predicate: Box::new(|name: &&str| *name == "swhite"),
        };
        assert_eq!(step.describe(), "Next matching username == swhite");
        assert_eq!(format!("{step:?}"), "Next matching username == swhite");
    }
}
