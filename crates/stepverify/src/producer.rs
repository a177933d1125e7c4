//! Producer abstraction driven by the verifier.
//!
//! A [`Producer`] is subscribed exactly once. It receives an [`Observer`] to
//! emit through and a [`Scheduler`] that decides where delayed work runs:
//! on the [`VirtualClock`] in virtual-time mode, on timer threads otherwise.
//!
//! The observer enforces the signal protocol on the producer's behalf:
//! nothing is delivered after a terminal signal or after cancellation, so a
//! subscription yields at most one terminal signal and it is always last.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::clock::VirtualClock;
use crate::signal::{ProducerError, Signal, Timed};

/// A source of signals.
pub trait Producer<T>: Send + 'static {
    /// Starts emission. May emit synchronously, schedule timed work, or
    /// spawn background work; must stop once the observer reports cancellation.
    fn subscribe(self, observer: Observer<T>, scheduler: &Scheduler) -> Subscription;
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle used to stop a running subscription.
///
/// Clones share the same state. Cancelling is idempotent, and it wakes any
/// real-time timer still waiting on behalf of this subscription.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    shared: Arc<SubscriptionState>,
}

#[derive(Debug, Default)]
struct SubscriptionState {
    cancelled: AtomicBool,
    /// Timer threads started for this subscription. Also the lock that
    /// waiting timers park on.
    timers: Mutex<Vec<JoinHandle<()>>>,
    wake: Condvar,
}

impl SubscriptionState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits out `delay`. Returns false if cancelled first.
    fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        let mut timers = self.timers.lock();
        self.wake.wait_while_for(&mut timers, |_| !self.is_cancelled(), delay);
        !self.is_cancelled()
    }
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stops the subscription and wakes its pending timers.
    pub fn cancel(&self) {
        if !self.shared.cancelled.swap(true, Ordering::SeqCst) {
            // Taking the lock orders this wakeup after any timer's check
            let _timers = self.shared.timers.lock();
            self.shared.wake.notify_all();
            tracing::debug!("subscription cancelled");
        }
    }

    /// Returns true once [`Subscription::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Runs `task` on a timer thread after `delay`, unless cancelled first.
    fn spawn_timer(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<()> {
        let mut timers = self.shared.timers.lock();
        if self.is_cancelled() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("stepverify-timer".to_string())
            .spawn(move || {
                if shared.sleep_unless_cancelled(delay) {
                    task();
                }
            })?;
        timers.retain(|timer| !timer.is_finished());
        timers.push(handle);
        Ok(())
    }

    /// Blocks until every timer thread of this subscription has exited.
    ///
    /// Call after [`Subscription::cancel`]; a timer that is already running
    /// its task is waited for, pending ones return at once.
    pub(crate) fn join_timers(&self) {
        loop {
            let timers = std::mem::take(&mut *self.shared.timers.lock());
            if timers.is_empty() {
                break;
            }
            for timer in timers {
                if timer.join().is_err() {
                    tracing::warn!("timer task panicked");
                }
            }
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

pub(crate) enum Outlet<T> {
    /// Real-time delivery; a full queue blocks the producer.
    Bounded(SyncSender<Timed<T>>),
    /// Virtual-time delivery on the verifier's own thread.
    Unbounded(Sender<Timed<T>>),
}

impl<T> Outlet<T> {
    fn send(&self, timed: Timed<T>) -> bool {
        match self {
            Outlet::Bounded(tx) => tx.send(timed).is_ok(),
            Outlet::Unbounded(tx) => tx.send(timed).is_ok(),
        }
    }
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        match self {
            Outlet::Bounded(tx) => Outlet::Bounded(tx.clone()),
            Outlet::Unbounded(tx) => Outlet::Unbounded(tx.clone()),
        }
    }
}

#[derive(Clone)]
pub(crate) enum TimeSource {
    Virtual(VirtualClock),
    Real(Instant),
}

impl TimeSource {
    fn now(&self) -> Duration {
        match self {
            TimeSource::Virtual(clock) => clock.now(),
            TimeSource::Real(started) => started.elapsed(),
        }
    }
}

/// Receiving end handed to a producer on subscription.
pub struct Observer<T> {
    outlet: Outlet<T>,
    time: TimeSource,
    subscription: Subscription,
    terminated: Arc<AtomicBool>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            outlet: self.outlet.clone(),
            time: self.time.clone(),
            subscription: self.subscription.clone(),
            terminated: Arc::clone(&self.terminated),
        }
    }
}

impl<T> Observer<T> {
    pub(crate) fn new(outlet: Outlet<T>, time: TimeSource) -> Self {
        Self {
            outlet,
            time,
            subscription: Subscription::new(),
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emits a value. Returns false if the value was dropped because the
    /// subscription is cancelled, already terminated, or the verifier is gone.
    pub fn on_next(&self, value: T) -> bool {
        if self.is_closed() {
            return false;
        }
        self.deliver(Signal::Next(value))
    }

    /// Terminates the subscription with an error. Ignored after a terminal signal.
    pub fn on_error(&self, error: ProducerError) {
        if self.claim_terminal() {
            self.deliver(Signal::Error(error));
        }
    }

    /// Terminates the subscription normally. Ignored after a terminal signal.
    pub fn on_complete(&self) {
        if self.claim_terminal() {
            self.deliver(Signal::Complete);
        }
    }

    /// Returns true once no further signal will be delivered.
    pub fn is_closed(&self) -> bool {
        self.subscription.is_cancelled() || self.terminated.load(Ordering::SeqCst)
    }

    /// Returns the handle that cancels this subscription.
    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    /// Current time as seen by this subscription.
    pub fn now(&self) -> Duration {
        self.time.now()
    }

    fn claim_terminal(&self) -> bool {
        !self.subscription.is_cancelled()
            && self
                .terminated
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    fn deliver(&self, signal: Signal<T>) -> bool {
        let timed = Timed {
            signal,
            at: self.time.now(),
        };
        if self.outlet.send(timed) {
            true
        } else {
            // The verifier dropped its receiver; nobody is listening anymore.
            self.subscription.cancel();
            false
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Where a producer's delayed work runs.
#[derive(Debug, Clone)]
pub enum Scheduler {
    /// Work is queued on the virtual clock and fires when the verifier advances it.
    Virtual(VirtualClock),
    /// Work runs on a timer thread after a real sleep. Cancelling the
    /// subscription wakes the timer and drops the work.
    RealTime(Subscription),
}

impl Scheduler {
    /// Runs `task` after `delay`.
    pub fn schedule(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<()> {
        match self {
            Scheduler::Virtual(clock) => {
                clock.schedule(delay, task);
                Ok(())
            }
            Scheduler::RealTime(subscription) => subscription.spawn_timer(delay, task),
        }
    }

    /// Returns true when delays elapse on a [`VirtualClock`].
    pub fn is_virtual(&self) -> bool {
        matches!(self, Scheduler::Virtual(_))
    }
}
