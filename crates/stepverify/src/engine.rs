//! The verifier engine.
//!
//! ```text
//! Idle ──subscribe──▶ Subscribed ──▶ Consuming ⇄ StepMatched ──▶ Terminated
//!                                        │                        (Success|Failure)
//!                                        └── timeout / clock exhausted ──┘
//! ```
//!
//! The [`Matcher`] is a pure state machine over signals: it knows nothing
//! about threads or clocks. The two drivers feed it:
//!
//! - **Real time**: the producer runs on its own thread and pushes into a
//!   bounded FIFO; the engine blocks on it until the deadline.
//! - **Virtual time**: the producer subscribes on the engine's thread and
//!   its timed work fires as the engine advances the [`VirtualClock`].
//!
//! Both drivers cancel the subscription before returning, whatever the verdict.

use std::fmt::Debug;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use stepverify_config::VerifierConfig;

use crate::clock::VirtualClock;
use crate::error::{Failure, FailureReason, VerifyError};
use crate::producer::{Observer, Outlet, Producer, Scheduler, Subscription, TimeSource};
use crate::script::{ConfigurationError, ExpectationStep, VerificationScript};
use crate::signal::{Signal, Timed};

pub(crate) type SubscribeFn<T> = Box<dyn FnOnce(Observer<T>, &Scheduler) -> Subscription + Send>;
pub(crate) type DeferredSubscribeFn<T> = Box<dyn FnOnce(Observer<T>, &Scheduler) -> Subscription>;

/// What the engine subscribes to, and in which mode.
pub(crate) enum Subject<T> {
    RealTime(SubscribeFn<T>),
    Virtual {
        max_advances: Option<u64>,
        subscribe: DeferredSubscribeFn<T>,
    },
}

impl<T: Send + 'static> Subject<T> {
    pub(crate) fn real_time<P: Producer<T>>(producer: P) -> Self {
        Subject::RealTime(Box::new(
            move |observer: Observer<T>, scheduler: &Scheduler| producer.subscribe(observer, scheduler),
        ))
    }

    /// The factory runs at subscription time, once the virtual clock exists.
    pub(crate) fn virtual_time<P, F>(max_advances: Option<u64>, factory: F) -> Self
    where
        P: Producer<T>,
        F: FnOnce() -> P + 'static,
    {
        Subject::Virtual {
            max_advances,
            subscribe: Box::new(move |observer: Observer<T>, scheduler: &Scheduler| {
                factory().subscribe(observer, scheduler)
            }),
        }
    }
}

/// Summary of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Signals consumed, terminal included.
    pub signals: usize,
    /// Wall-clock time spent verifying.
    pub elapsed: Duration,
    /// Final virtual time, for virtual-time runs.
    pub virtual_time: Option<Duration>,
    /// Number of times the virtual clock was advanced.
    pub advances: u64,
}

// ============================================================================
// Matcher
// ============================================================================

#[derive(Debug)]
pub(crate) enum Progress {
    Pending,
    Done(Result<(), Failure>),
}

/// Matches signals against steps, one signal at a time.
pub(crate) struct Matcher<T> {
    steps: Vec<ExpectationStep<T>>,
    cursor: usize,
    /// Values still owed to the count step under the cursor.
    remaining: Option<u64>,
    consumed: usize,
}

impl<T: Debug + PartialEq> Matcher<T> {
    pub(crate) fn new(steps: Vec<ExpectationStep<T>>) -> Self {
        Self {
            steps,
            cursor: 0,
            remaining: None,
            consumed: 0,
        }
    }

    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    /// Enters the step under the cursor: seeds count steps, skips empty
    /// counts, and resolves a reached cancellation step.
    pub(crate) fn settle(&mut self) -> Progress {
        loop {
            match self.steps.get(self.cursor) {
                Some(ExpectationStep::ExpectCount(0)) => self.cursor += 1,
                Some(ExpectationStep::ExpectCount(n)) => {
                    if self.remaining.is_none() {
                        self.remaining = Some(*n);
                    }
                    return Progress::Pending;
                }
                Some(ExpectationStep::ThenCancel) => {
                    tracing::debug!(step = self.cursor, "preceding steps matched, cancelling");
                    return Progress::Done(Ok(()));
                }
                Some(_) => return Progress::Pending,
                // Validated scripts always end in a terminal step
                None => return Progress::Done(Ok(())),
            }
        }
    }

    fn advance(&mut self) -> Progress {
        self.cursor += 1;
        self.remaining = None;
        self.settle()
    }

    pub(crate) fn on_signal(&mut self, timed: &Timed<T>) -> Progress {
        use ExpectationStep as Step;

        self.consumed += 1;
        let index = self.cursor;
        tracing::debug!(step = index, signal = ?timed.signal, "signal received");

        let Some(step) = self.steps.get(index) else {
            return self.reject(FailureReason::UnexpectedElement, timed);
        };

        match (step, &timed.signal) {
            (Step::ExpectValue(expected), Signal::Next(value)) => {
                if expected == value {
                    self.advance()
                } else {
                    self.reject(FailureReason::ValueMismatch, timed)
                }
            }
            (Step::ExpectPredicate { predicate, .. }, Signal::Next(value)) => {
                if predicate(value) {
                    self.advance()
                } else {
                    self.reject(FailureReason::PredicateMismatch, timed)
                }
            }
            (Step::ExpectCount(n), Signal::Next(_)) => {
                let remaining = self.remaining.unwrap_or(*n).saturating_sub(1);
                if remaining == 0 {
                    self.advance()
                } else {
                    self.remaining = Some(remaining);
                    Progress::Pending
                }
            }
            (Step::ExpectCount(n), _) => {
                let expected = *n;
                let observed = expected - self.remaining.unwrap_or(expected);
                self.reject(FailureReason::CountMismatch { expected, observed }, timed)
            }
            (Step::ExpectValue(_) | Step::ExpectPredicate { .. }, _) => {
                self.reject(FailureReason::UnexpectedTermination, timed)
            }
            (Step::ThenCancel, _) => Progress::Done(Ok(())),
            // Every remaining step is terminal: a value here is one too many.
            (_, Signal::Next(_)) => {
                let previous = index.checked_sub(1).and_then(|i| self.steps.get(i));
                let reason = match previous {
                    Some(Step::ExpectCount(n)) => FailureReason::CountMismatch {
                        expected: *n,
                        observed: n + 1,
                    },
                    _ => FailureReason::UnexpectedElement,
                };
                self.reject(reason, timed)
            }
            (Step::ExpectCompletion, Signal::Complete) => Progress::Done(Ok(())),
            (Step::ExpectCompletion, Signal::Error(_))
            | (
                Step::ExpectErrorKind(_)
                | Step::ExpectErrorMessage(_)
                | Step::ExpectErrorPredicate { .. },
                Signal::Complete,
            ) => self.reject(FailureReason::WrongTerminalKind, timed),
            (Step::ExpectErrorKind(kind), Signal::Error(err)) => {
                if err.kind() == kind {
                    Progress::Done(Ok(()))
                } else {
                    self.reject(FailureReason::ErrorKindMismatch, timed)
                }
            }
            (Step::ExpectErrorMessage(message), Signal::Error(err)) => {
                if err.detail() == message {
                    Progress::Done(Ok(()))
                } else {
                    self.reject(FailureReason::ErrorMessageMismatch, timed)
                }
            }
            (Step::ExpectErrorPredicate { predicate, .. }, Signal::Error(err)) => {
                if predicate(err) {
                    Progress::Done(Ok(()))
                } else {
                    self.reject(FailureReason::PredicateMismatch, timed)
                }
            }
        }
    }

    fn expected_here(&self) -> String {
        match (self.steps.get(self.cursor), self.remaining) {
            (Some(ExpectationStep::ExpectCount(n)), Some(remaining)) => {
                format!("{n} Next signals ({remaining} remaining)")
            }
            (Some(step), _) => step.describe(),
            (None, _) => "end of script".to_string(),
        }
    }

    fn failure(&self, reason: FailureReason, received: Option<String>) -> Failure {
        Failure {
            reason,
            step_index: self.cursor,
            expected: self.expected_here(),
            received,
        }
    }

    fn reject(&self, reason: FailureReason, timed: &Timed<T>) -> Progress {
        Progress::Done(Err(self.failure(reason, Some(timed.describe()))))
    }

    pub(crate) fn timed_out(&self, deadline: Duration) -> Failure {
        self.failure(FailureReason::Timeout { deadline }, None)
    }

    pub(crate) fn exhausted(&self, advances: u64) -> Failure {
        self.failure(FailureReason::ClockExhausted { advances }, None)
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Runs `script` against `subject`, filling unset limits from `config`.
pub(crate) fn run<T>(
    script: VerificationScript<T>,
    subject: Subject<T>,
    config: &VerifierConfig,
) -> Result<VerificationReport, VerifyError>
where
    T: Debug + PartialEq + Send + 'static,
{
    let script_deadline = script.deadline();
    let deadline = script_deadline.unwrap_or_else(|| config.default_timeout());
    let initial_offset = script
        .initial_offset()
        .unwrap_or_else(|| config.initial_offset());
    let matcher = Matcher::new(script.into_steps());

    match subject {
        Subject::RealTime(subscribe) => {
            run_real_time(matcher, subscribe, deadline, config.realtime.queue_capacity)
        }
        Subject::Virtual {
            max_advances,
            subscribe,
        } => {
            if script_deadline.is_some() {
                return Err(ConfigurationError::DeadlineInVirtualTime.into());
            }
            let budget = max_advances.unwrap_or(config.virtual_time.max_advances);
            if budget == 0 {
                return Err(ConfigurationError::ZeroAdvanceBudget.into());
            }
            run_virtual(matcher, subscribe, budget, initial_offset)
        }
    }
}

fn run_real_time<T>(
    mut matcher: Matcher<T>,
    subscribe: SubscribeFn<T>,
    deadline: Duration,
    queue_capacity: usize,
) -> Result<VerificationReport, VerifyError>
where
    T: Debug + PartialEq + Send + 'static,
{
    let span = tracing::debug_span!("verify", mode = "real-time", ?deadline);
    let _entered = span.enter();

    let started = Instant::now();
    let (tx, rx) = mpsc::sync_channel(queue_capacity);
    // A producer that drops its observer without a terminal signal must
    // still run into the deadline rather than disconnect the queue.
    let held = tx.clone();
    let observer = Observer::new(Outlet::Bounded(tx), TimeSource::Real(started));
    let subscription = observer.subscription();
    let scheduler = Scheduler::RealTime(subscription.clone());

    // Subscribing off-thread keeps synchronous producers from blocking on a
    // full queue that nobody is draining yet.
    thread::Builder::new()
        .name("stepverify-producer".to_string())
        .spawn(move || {
            subscribe(observer, &scheduler);
        })
        .map_err(VerifyError::Spawn)?;
    tracing::debug!("subscribed");

    let mut progress = matcher.settle();
    let outcome = loop {
        if let Progress::Done(result) = progress {
            break result;
        }
        let remaining = deadline.saturating_sub(started.elapsed());
        match rx.recv_timeout(remaining) {
            Ok(timed) => progress = matcher.on_signal(&timed),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                break Err(matcher.timed_out(deadline));
            }
        }
    };

    subscription.cancel();
    // Dropping the receiver wakes any producer blocked on a full queue.
    drop(held);
    drop(rx);
    // No timer outlives the verification.
    subscription.join_timers();

    conclude(
        outcome,
        VerificationReport {
            signals: matcher.consumed(),
            elapsed: started.elapsed(),
            virtual_time: None,
            advances: 0,
        },
    )
}

fn run_virtual<T>(
    mut matcher: Matcher<T>,
    subscribe: DeferredSubscribeFn<T>,
    max_advances: u64,
    initial_offset: Duration,
) -> Result<VerificationReport, VerifyError>
where
    T: Debug + PartialEq + Send + 'static,
{
    let span = tracing::debug_span!("verify", mode = "virtual-time", max_advances);
    let _entered = span.enter();

    let started = Instant::now();
    let clock = VirtualClock::starting_at(initial_offset);
    let (tx, rx) = mpsc::channel();
    let observer = Observer::new(Outlet::Unbounded(tx), TimeSource::Virtual(clock.clone()));
    let subscription = observer.subscription();

    subscribe(observer, &Scheduler::Virtual(clock.clone()));
    tracing::debug!("subscribed");

    let mut advances = 0u64;
    let mut progress = matcher.settle();
    let outcome = loop {
        if let Progress::Done(result) = progress {
            break result;
        }
        if let Ok(timed) = rx.try_recv() {
            progress = matcher.on_signal(&timed);
            continue;
        }
        if advances >= max_advances {
            break Err(matcher.exhausted(advances));
        }
        match clock.advance_to_next_scheduled() {
            Some(now) => {
                advances += 1;
                tracing::debug!(?now, advances, "clock advanced");
            }
            None => break Err(matcher.exhausted(advances)),
        }
    };

    subscription.cancel();
    // Pending callbacks hold observers, which hold the clock.
    clock.clear();

    conclude(
        outcome,
        VerificationReport {
            signals: matcher.consumed(),
            elapsed: started.elapsed(),
            virtual_time: Some(clock.now()),
            advances,
        },
    )
}

fn conclude(
    outcome: Result<(), Failure>,
    report: VerificationReport,
) -> Result<VerificationReport, VerifyError> {
    match outcome {
        Ok(()) => {
            tracing::info!(
                signals = report.signals,
                elapsed = ?report.elapsed,
                advances = report.advances,
                "verification succeeded"
            );
            Ok(report)
        }
        Err(failure) => {
            tracing::warn!(
                step = failure.step_index,
                reason = %failure.reason,
                "verification failed"
            );
            Err(failure.into())
        }
    }
}
