//! Virtual clock for deterministic time compression.
//!
//! The clock owns the current virtual time and a queue of pending callbacks
//! ordered by fire time. Time only moves when the verifier advances it, and
//! advancing fires every callback that falls inside the window on the calling
//! thread, so an hour of one-second ticks verifies without any real waiting.
//!
//! # Ordering
//!
//! ```text
//! fire order = (fire time ascending, registration order ascending)
//! ```
//!
//! Callbacks registered while an advance is in progress fire in the same
//! advance when their fire time is still inside the window.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Callback fired when the clock reaches its scheduled time.
pub type Task = Box<dyn FnOnce() + Send>;

/// Unique identifier for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Converts a duration to whole nanoseconds, saturating at `u64::MAX`.
pub fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

struct Scheduled {
    at_ns: u64,
    id: TaskId,
    task: Task,
}

// BinaryHeap is a max-heap, so the comparison is reversed to pop the
// earliest (time, id) first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at_ns
            .cmp(&self.at_ns)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at_ns == other.at_ns && self.id == other.id
    }
}

impl Eq for Scheduled {}

#[derive(Default)]
struct ClockState {
    now_ns: u64,
    queue: BinaryHeap<Scheduled>,
    next_id: u64,
    fired: u64,
}

/// Shared handle to a virtual clock.
///
/// Clones refer to the same clock. The lock is never held while a callback
/// runs, so callbacks may read the time and schedule further work.
#[derive(Clone, Default)]
pub struct VirtualClock {
    state: Arc<Mutex<ClockState>>,
}

impl VirtualClock {
    /// Creates a clock at time zero with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose time starts at `offset`.
    pub fn starting_at(offset: Duration) -> Self {
        let clock = Self::new();
        clock.state.lock().now_ns = duration_to_ns(offset);
        clock
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns())
    }

    /// Current virtual time in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        self.state.lock().now_ns
    }

    /// Registers `task` to fire at `now + delay`.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> TaskId {
        let mut state = self.state.lock();
        let at_ns = state.now_ns.saturating_add(duration_to_ns(delay));
        Self::push(&mut state, at_ns, Box::new(task))
    }

    /// Registers `task` to fire at an absolute virtual time.
    ///
    /// A time in the past fires on the next advance.
    pub fn schedule_at(&self, at: Duration, task: impl FnOnce() + Send + 'static) -> TaskId {
        let mut state = self.state.lock();
        let at_ns = duration_to_ns(at).max(state.now_ns);
        Self::push(&mut state, at_ns, Box::new(task))
    }

    fn push(state: &mut ClockState, at_ns: u64, task: Task) -> TaskId {
        let id = TaskId(state.next_id);
        state.next_id += 1;
        state.queue.push(Scheduled { at_ns, id, task });
        id
    }

    /// Returns the fire time of the soonest pending callback.
    pub fn next_time(&self) -> Option<Duration> {
        self.state
            .lock()
            .queue
            .peek()
            .map(|next| Duration::from_nanos(next.at_ns))
    }

    /// Returns the number of pending callbacks.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns the number of callbacks fired so far.
    pub fn fired(&self) -> u64 {
        self.state.lock().fired
    }

    /// Moves time forward by `delta`, firing every callback due in the window.
    ///
    /// Returns the number of callbacks fired.
    pub fn advance_by(&self, delta: Duration) -> usize {
        let target_ns = self.now_ns().saturating_add(duration_to_ns(delta));
        self.fire_until(target_ns)
    }

    /// Moves time forward to `target`. A target in the past leaves time unchanged.
    pub fn advance_to(&self, target: Duration) -> usize {
        self.fire_until(duration_to_ns(target))
    }

    /// Jumps straight to the soonest pending callback and fires everything due then.
    ///
    /// Returns the new time, or `None` if nothing is scheduled.
    pub fn advance_to_next_scheduled(&self) -> Option<Duration> {
        let next = self.next_time()?;
        self.advance_to(next);
        Some(next)
    }

    /// Drops every pending callback without firing it.
    pub fn clear(&self) {
        // Tasks are dropped outside the lock; their destructors may touch the clock.
        let drained = std::mem::take(&mut self.state.lock().queue);
        drop(drained);
    }

    fn fire_until(&self, target_ns: u64) -> usize {
        let mut fired = 0;
        loop {
            let task = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .peek()
                    .is_some_and(|next| next.at_ns <= target_ns);
                if !due {
                    state.now_ns = state.now_ns.max(target_ns);
                    break;
                }
                let Some(entry) = state.queue.pop() else {
                    break;
                };
                debug_assert!(
                    entry.at_ns >= state.now_ns,
                    "callback scheduled in the past: now={}, at={}",
                    state.now_ns,
                    entry.at_ns
                );
                state.now_ns = state.now_ns.max(entry.at_ns);
                state.fired += 1;
                entry.task
            };
            task();
            fired += 1;
        }
        fired
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualClock")
            .field("now_ns", &state.now_ns)
            .field("pending", &state.queue.len())
            .field("fired", &state.fired)
            .finish()
    }
}
