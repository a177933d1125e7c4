//! Minimal producers for driving verifications.
//!
//! These cover fixed sequences, failure, silence and periodic emission. They
//! are not an operator library: transformations belong in caller code, either
//! applied to values before they reach [`just`] or written as a [`create`]
//! closure.

use std::time::Duration;

use crate::producer::{Observer, Producer, Scheduler, Subscription};
use crate::signal::ProducerError;

/// Emits `values` synchronously on subscription, then completes.
pub fn just<T>(values: impl IntoIterator<Item = T>) -> Just<T> {
    Just {
        values: values.into_iter().collect(),
        error: None,
    }
}

/// Completes immediately without emitting.
pub fn empty<T>() -> Just<T> {
    just(Vec::new())
}

/// Fails immediately without emitting.
pub fn error<T>(error: ProducerError) -> Just<T> {
    empty().concat_error(error)
}

/// Never emits and never terminates.
pub fn never() -> Never {
    Never
}

/// Emits `0, 1, 2, ...` every `period`, starting one period after subscription.
pub fn interval(period: Duration) -> Interval {
    Interval {
        period,
        limit: None,
    }
}

/// Wraps a closure as a producer.
///
/// The closure receives the observer and scheduler exactly as
/// [`Producer::subscribe`] would.
pub fn create<T, F>(subscribe: F) -> Create<F>
where
    F: FnOnce(Observer<T>, &Scheduler) + Send + 'static,
{
    Create { subscribe }
}

// ============================================================================
// Just
// ============================================================================

/// Fixed sequence of values followed by completion or an error.
#[derive(Debug, Clone)]
pub struct Just<T> {
    values: Vec<T>,
    error: Option<ProducerError>,
}

impl<T> Just<T> {
    /// Terminates with `error` instead of completing.
    pub fn concat_error(mut self, error: ProducerError) -> Self {
        self.error = Some(error);
        self
    }
}

impl<T: Send + 'static> Producer<T> for Just<T> {
    fn subscribe(self, observer: Observer<T>, _scheduler: &Scheduler) -> Subscription {
        let subscription = observer.subscription();
        for value in self.values {
            if !observer.on_next(value) {
                return subscription;
            }
        }
        match self.error {
            Some(error) => observer.on_error(error),
            None => observer.on_complete(),
        }
        subscription
    }
}

// ============================================================================
// Never
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Never;

impl<T: Send + 'static> Producer<T> for Never {
    fn subscribe(self, observer: Observer<T>, _scheduler: &Scheduler) -> Subscription {
        observer.subscription()
    }
}

// ============================================================================
// Interval
// ============================================================================

/// Periodic counter, optionally limited to a number of values.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    period: Duration,
    limit: Option<u64>,
}

impl Interval {
    /// Completes after emitting `count` values.
    pub fn take(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    fn tick(self, observer: Observer<u64>, scheduler: Scheduler, index: u64) {
        let on_failure = observer.clone();
        let next_scheduler = scheduler.clone();
        let scheduled = scheduler.schedule(self.period, move || {
            if !observer.on_next(index) {
                return;
            }
            let emitted = index + 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                observer.on_complete();
            } else {
                self.tick(observer, next_scheduler, emitted);
            }
        });
        if let Err(err) = scheduled {
            tracing::warn!(error = %err, index, "interval failed to schedule tick");
            on_failure.on_error(ProducerError::of(&err));
        }
    }
}

impl Producer<u64> for Interval {
    fn subscribe(self, observer: Observer<u64>, scheduler: &Scheduler) -> Subscription {
        let subscription = observer.subscription();
        if self.limit == Some(0) {
            observer.on_complete();
        } else {
            self.tick(observer, scheduler.clone(), 0);
        }
        subscription
    }
}

// ============================================================================
// Create
// ============================================================================

/// Producer backed by a subscribe closure.
pub struct Create<F> {
    subscribe: F,
}

impl<T, F> Producer<T> for Create<F>
where
    F: FnOnce(Observer<T>, &Scheduler) + Send + 'static,
{
    fn subscribe(self, observer: Observer<T>, scheduler: &Scheduler) -> Subscription {
        let subscription = observer.subscription();
        (self.subscribe)(observer, scheduler);
        subscription
    }
}
