//! Fluent construction of verification scripts.
//!
//! ```ignore
//! StepVerifier::create(just(["foo", "bar"]))
//!     .expect_next(["foo", "bar"])
//!     .expect_complete()
//!     .verify()?;
//! ```
//!
//! Non-terminal steps return [`Steps`]; terminal steps return a
//! [`Verification`], so a script cannot be verified before it is closed and
//! cannot be extended after. Malformed input (such as an empty
//! `expect_next`) is recorded and reported by `verify` as a
//! [`ConfigurationError`] before anything is subscribed.

use std::fmt::Debug;
use std::time::Duration;

use stepverify_config::VerifierConfig;

use crate::engine::{self, Subject, VerificationReport};
use crate::error::VerifyError;
use crate::producer::Producer;
use crate::script::{ConfigurationError, ExpectationStep, VerificationScript};
use crate::signal::{ProducerError, kind_of};

/// Entry point for building verifications.
#[derive(Debug, Clone, Copy)]
pub struct StepVerifier;

impl StepVerifier {
    /// Verifies `producer` in real time.
    pub fn create<T, P>(producer: P) -> Steps<T>
    where
        T: Send + 'static,
        P: Producer<T>,
    {
        Steps::new(Subject::real_time(producer))
    }

    /// Verifies the producer built by `factory` against a virtual clock.
    ///
    /// `factory` runs when `verify` is called, after the clock exists, so that
    /// every timed operation it sets up lands on virtual time. The run fails
    /// with `ClockExhausted` once the clock has been advanced `max_advances`
    /// times without the script resolving.
    pub fn with_virtual_time<T, P, F>(max_advances: u64, factory: F) -> Steps<T>
    where
        T: Send + 'static,
        P: Producer<T>,
        F: FnOnce() -> P + 'static,
    {
        Steps::new(Subject::virtual_time(Some(max_advances), factory))
    }

    /// Like [`StepVerifier::with_virtual_time`], with the advance budget taken
    /// from configuration.
    pub fn virtual_time<T, P, F>(factory: F) -> Steps<T>
    where
        T: Send + 'static,
        P: Producer<T>,
        F: FnOnce() -> P + 'static,
    {
        Steps::new(Subject::virtual_time(None, factory))
    }
}

/// Verifies a prebuilt script against `producer` in real time.
pub fn verify_script<T, P>(
    script: VerificationScript<T>,
    producer: P,
    config: &VerifierConfig,
) -> Result<VerificationReport, VerifyError>
where
    T: Debug + PartialEq + Send + 'static,
    P: Producer<T>,
{
    engine::run(script, Subject::real_time(producer), config)
}

/// Verifies a prebuilt script against the producer built by `factory` on a
/// virtual clock.
pub fn verify_script_virtual<T, P, F>(
    script: VerificationScript<T>,
    max_advances: u64,
    factory: F,
    config: &VerifierConfig,
) -> Result<VerificationReport, VerifyError>
where
    T: Debug + PartialEq + Send + 'static,
    P: Producer<T>,
    F: FnOnce() -> P + 'static,
{
    engine::run(
        script,
        Subject::virtual_time(Some(max_advances), factory),
        config,
    )
}

// ============================================================================
// Steps
// ============================================================================

/// An open script: more steps may follow.
#[must_use = "a script does nothing until closed with a terminal step and verified"]
pub struct Steps<T> {
    subject: Subject<T>,
    steps: Vec<ExpectationStep<T>>,
    initial_offset: Option<Duration>,
    error: Option<ConfigurationError>,
}

impl<T> Steps<T> {
    fn new(subject: Subject<T>) -> Self {
        Self {
            subject,
            steps: Vec::new(),
            initial_offset: None,
            error: None,
        }
    }
}

impl<T: Debug + PartialEq + Send + 'static> Steps<T> {
    /// Expects exactly these values, in order, one step each.
    pub fn expect_next(mut self, values: impl IntoIterator<Item = T>) -> Self {
        let index = self.steps.len();
        self.steps
            .extend(values.into_iter().map(ExpectationStep::ExpectValue));
        if self.steps.len() == index {
            self.record(ConfigurationError::EmptyExpectNext { index });
        }
        self
    }

    /// Expects one value satisfying `predicate`.
    pub fn expect_next_matching(self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.expect_next_matching_described("predicate", predicate)
    }

    /// Like [`Steps::expect_next_matching`], with a description shown in
    /// failure reports.
    pub fn expect_next_matching_described(
        mut self,
        description: impl Into<String>,
        predicate: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        self.steps.push(ExpectationStep::ExpectPredicate {
            description: description.into(),
            predicate: Box::new(predicate),
        });
        self
    }

    /// Expects `n` values without inspecting them. Zero is allowed and
    /// matches nothing.
    pub fn expect_next_count(mut self, n: u64) -> Self {
        self.steps.push(ExpectationStep::ExpectCount(n));
        self
    }

    /// Starts the virtual clock at `offset` instead of the configured default.
    pub fn with_initial_offset(mut self, offset: Duration) -> Self {
        self.initial_offset = Some(offset);
        self
    }

    /// Expects normal completion.
    pub fn expect_complete(self) -> Verification<T> {
        self.close(ExpectationStep::ExpectCompletion)
    }

    /// Expects termination with an error of `kind`.
    pub fn expect_error(self, kind: impl Into<String>) -> Verification<T> {
        self.close(ExpectationStep::ExpectErrorKind(kind.into()))
    }

    /// Expects termination with an error built by [`ProducerError::of`] from
    /// an `E`.
    pub fn expect_error_of<E: ?Sized + 'static>(self) -> Verification<T> {
        self.expect_error(kind_of::<E>())
    }

    /// Expects termination with an error whose detail equals `message`.
    pub fn expect_error_message(self, message: impl Into<String>) -> Verification<T> {
        self.close(ExpectationStep::ExpectErrorMessage(message.into()))
    }

    /// Expects termination with an error satisfying `predicate`.
    pub fn expect_error_matching(
        self,
        predicate: impl Fn(&ProducerError) -> bool + 'static,
    ) -> Verification<T> {
        self.expect_error_matching_described("predicate", predicate)
    }

    /// Like [`Steps::expect_error_matching`], naming the predicate in failures.
    pub fn expect_error_matching_described(
        self,
        description: impl Into<String>,
        predicate: impl Fn(&ProducerError) -> bool + 'static,
    ) -> Verification<T> {
        self.close(ExpectationStep::ExpectErrorPredicate {
            description: description.into(),
            predicate: Box::new(predicate),
        })
    }

    /// Cancels the subscription once every preceding step has matched.
    pub fn then_cancel(self) -> Verification<T> {
        self.close(ExpectationStep::ThenCancel)
    }

    fn record(&mut self, error: ConfigurationError) {
        // First error wins
        self.error.get_or_insert(error);
    }

    fn close(mut self, terminal: ExpectationStep<T>) -> Verification<T> {
        self.steps.push(terminal);
        Verification {
            subject: self.subject,
            steps: self.steps,
            initial_offset: self.initial_offset,
            error: self.error,
        }
    }
}

// ============================================================================
// Verification
// ============================================================================

/// A closed script bound to its producer, ready to run.
#[must_use = "a verification does nothing until `verify` is called"]
pub struct Verification<T> {
    subject: Subject<T>,
    steps: Vec<ExpectationStep<T>>,
    initial_offset: Option<Duration>,
    error: Option<ConfigurationError>,
}

impl<T: Debug + PartialEq + Send + 'static> Verification<T> {
    /// Runs with the process-wide configuration.
    pub fn verify(self) -> Result<VerificationReport, VerifyError> {
        self.run(crate::default_config(), None)
    }

    /// Runs with an explicit real-time deadline.
    ///
    /// Virtual-time verifications are bounded by their advance budget and
    /// reject a deadline with [`ConfigurationError::DeadlineInVirtualTime`].
    pub fn verify_timeout(self, deadline: Duration) -> Result<VerificationReport, VerifyError> {
        self.run(crate::default_config(), Some(deadline))
    }

    /// Runs with `config` in place of the process-wide configuration.
    pub fn verify_with(self, config: &VerifierConfig) -> Result<VerificationReport, VerifyError> {
        self.run(config, None)
    }

    fn run(
        self,
        config: &VerifierConfig,
        deadline: Option<Duration>,
    ) -> Result<VerificationReport, VerifyError> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        if matches!(
            self.subject,
            Subject::Virtual {
                max_advances: Some(0),
                ..
            }
        ) {
            return Err(ConfigurationError::ZeroAdvanceBudget.into());
        }

        let mut script = VerificationScript::new(self.steps)?;
        if let Some(deadline) = deadline {
            script = script.with_deadline(deadline)?;
        }
        if let Some(offset) = self.initial_offset {
            script = script.with_initial_offset(offset);
        }
        engine::run(script, self.subject, config)
    }
}
