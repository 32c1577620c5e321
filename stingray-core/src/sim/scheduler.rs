//! Time-ordered event queue and dispatch loop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::VirtualClock;
use crate::{Result, StingrayError};

/// Callback dispatched by the scheduler.
///
/// Callbacks receive the scheduler itself so they can read the virtual clock
/// and schedule further events, which become visible to subsequent dispatches
/// within the same run.
pub type EventCallback = Box<dyn FnOnce(&mut Scheduler) -> Result<()>>;

/// Opaque handle to a pending event, accepted by [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

/// A scheduled event: fire-time, one-shot callback, and a sequence id used
/// as the FIFO tie-breaker among events with equal fire-times.
struct ScheduledEvent {
    at: Duration,
    seq: u64,
    callback: EventCallback,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both fields: BinaryHeap is a max-heap, and the
        // dispatch order is (earliest fire-time, lowest sequence id) first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of a completed scheduler run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Events dispatched over the scheduler's lifetime
    pub events_dispatched: u64,
    /// Virtual time at the end of the run
    pub elapsed: Duration,
    /// Whether the queue was exhausted before the horizon
    pub queue_drained: bool,
}

/// Global time-ordered event scheduler.
///
/// Single logical thread of control: callbacks never run concurrently, and
/// two events with equal fire-times dispatch sequentially in enqueue order,
/// which makes a whole run deterministic given a fixed insertion order.
pub struct Scheduler {
    clock: VirtualClock,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    cancelled: HashSet<u64>,
    dispatched: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler at virtual time zero.
    pub fn new() -> Self {
        Self {
            clock: VirtualClock::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            cancelled: HashSet::new(),
            dispatched: 0,
        }
    }

    /// Returns current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Returns the number of events dispatched so far.
    pub fn events_dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Returns the number of events still pending in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Schedules a callback to fire after `delay`.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidDelay` - If the resulting fire-time overflows
    pub fn schedule_in(&mut self, delay: Duration, callback: EventCallback) -> Result<EventHandle> {
        let at = self
            .clock
            .now()
            .checked_add(delay)
            .ok_or_else(|| StingrayError::InvalidDelay {
                reason: format!("delay {delay:?} overflows the virtual clock"),
            })?;
        self.schedule_at(at, callback)
    }

    /// Schedules a callback to fire at absolute virtual time `at`.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidDelay` - If `at` is behind the virtual clock
    pub fn schedule_at(&mut self, at: Duration, callback: EventCallback) -> Result<EventHandle> {
        if at < self.clock.now() {
            return Err(StingrayError::InvalidDelay {
                reason: format!("fire-time {at:?} is behind the clock ({:?})", self.clock.now()),
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent { at, seq, callback });
        trace!(seq, at_secs = at.as_secs_f64(), "event scheduled");

        Ok(EventHandle(seq))
    }

    /// Cancels a not-yet-fired event.
    ///
    /// A no-op for events that already fired, were already cancelled, or for
    /// unknown handles. Cancelling an event that is mid-dispatch has no
    /// effect on the in-flight invocation.
    pub fn cancel(&mut self, handle: EventHandle) {
        if handle.0 < self.next_seq {
            self.cancelled.insert(handle.0);
        }
    }

    /// Dispatches events in non-decreasing fire-time order until the queue
    /// empties or the next event would fire past `horizon`, then advances
    /// the clock to the horizon.
    ///
    /// # Errors
    ///
    /// - `StingrayError::CallbackFailure` - A callback returned an error;
    ///   the run is aborted and state accumulated so far stays inspectable
    /// - `StingrayError::InvalidDelay` - `horizon` is behind the clock
    pub fn run_until(&mut self, horizon: Duration) -> Result<RunSummary> {
        if horizon < self.clock.now() {
            return Err(StingrayError::InvalidDelay {
                reason: format!(
                    "horizon {horizon:?} is behind the clock ({:?})",
                    self.clock.now()
                ),
            });
        }

        let mut queue_drained = true;
        while let Some(event) = self.queue.pop() {
            if event.at > horizon {
                self.queue.push(event);
                queue_drained = false;
                break;
            }
            if self.cancelled.remove(&event.seq) {
                trace!(seq = event.seq, "cancelled event skipped");
                continue;
            }

            self.clock.advance_to(event.at)?;
            self.dispatched += 1;
            (event.callback)(self).map_err(|source| {
                debug!(seq = event.seq, %source, "callback aborted the run");
                StingrayError::CallbackFailure {
                    at: self.clock.now(),
                    source: Box::new(source),
                }
            })?;
        }

        self.clock.advance_to(horizon)?;
        Ok(RunSummary {
            events_dispatched: self.dispatched,
            elapsed: self.clock.now(),
            queue_drained,
        })
    }
}
