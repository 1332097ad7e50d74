use std::any::Any;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::trace;
use uuid::Uuid;

use crate::error::InvariantViolation;
use crate::types::{EventId, Priority};
use crate::{Key, SimTime};

/// Entry stored in the scheduler: the event value, the component it is
/// addressed to, and its position in the total order.
///
/// The order is `time` ascending, then `priority` descending, then insertion
/// order (`id` ascending). No two entries compare equal, so execution order
/// never depends on heap internals.
pub struct EventEntry {
    id: EventId,
    time: SimTime,
    priority: Priority,
    pub(crate) component: Uuid,
    inner: Box<dyn Any>,
}

impl fmt::Debug for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEntry")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("priority", &self.priority)
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl EventEntry {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Tries to downcast the event entry to one holding an event of type `E`.
    /// If fails, returns `None`.
    #[must_use]
    pub fn downcast<E: fmt::Debug + 'static>(&self) -> Option<EventEntryTyped<'_, E>> {
        self.inner.downcast_ref::<E>().map(|event| EventEntryTyped {
            id: self.id,
            time: self.time,
            component_key: Key::new_with_id(self.component),
            event,
        })
    }
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: "greater" means "runs first".
        other
            .time
            .cmp(&self.time)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug)]
pub struct EventEntryTyped<'e, E: fmt::Debug> {
    pub id: EventId,
    pub time: SimTime,
    pub component_key: Key<E>,
    pub event: &'e E,
}

type Clock = Rc<Cell<SimTime>>;

/// This struct exposes only immutable access to the simulation clock.
/// The clock itself is owned by the scheduler, while others can obtain `ClockRef`
/// to read the current simulation time.
///
/// # Example
///
/// ```
/// # use faultline_core::Scheduler;
/// let scheduler = Scheduler::default();
/// let clock_ref = scheduler.clock();
/// assert_eq!(clock_ref.time(), scheduler.time());
/// ```
#[derive(Clone)]
pub struct ClockRef {
    clock: Clock,
}

impl ClockRef {
    /// Return the current simulation time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.clock.get()
    }
}

/// The event queue. Owns the clock and advances it as events are popped.
///
/// Cancellation is lazy: a canceled entry stays in the heap and is skipped
/// when it reaches the front.
pub struct Scheduler {
    next_event_id: u64,
    events: BinaryHeap<EventEntry>,
    pending: HashSet<EventId>,
    canceled: HashSet<EventId>,
    clock: Clock,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            next_event_id: 0,
            events: BinaryHeap::default(),
            pending: HashSet::new(),
            canceled: HashSet::new(),
            clock: Rc::new(Cell::new(SimTime::zero())),
        }
    }
}

impl Scheduler {
    /// Schedules `event` for `component` at `self.time() + delay` with normal priority.
    pub fn schedule<E: fmt::Debug + 'static>(&mut self, delay: SimTime, component: Key<E>, event: E) -> EventId {
        self.schedule_with_priority(delay, Priority::Normal, component, event)
    }

    /// Schedules `event` for `component` at `self.time()`.
    pub fn schedule_now<E: fmt::Debug + 'static>(&mut self, component: Key<E>, event: E) -> EventId {
        self.schedule(SimTime::zero(), component, event)
    }

    /// Schedules `event` at `self.time() + delay` with an explicit priority.
    pub fn schedule_with_priority<E: fmt::Debug + 'static>(
        &mut self,
        delay: SimTime,
        priority: Priority,
        component: Key<E>,
        event: E,
    ) -> EventId {
        let time = self.time() + delay;
        self.push(time, priority, component, event)
    }

    /// Schedules `event` at the absolute instant `time`, which must not lie in the past.
    pub fn schedule_at<E: fmt::Debug + 'static>(
        &mut self,
        time: SimTime,
        priority: Priority,
        component: Key<E>,
        event: E,
    ) -> Result<EventId, InvariantViolation> {
        let now = self.time();
        if time < now {
            return Err(InvariantViolation::ScheduleInPast { now, requested: time });
        }
        Ok(self.push(time, priority, component, event))
    }

    fn push<E: fmt::Debug + 'static>(&mut self, time: SimTime, priority: Priority, component: Key<E>, event: E) -> EventId {
        self.next_event_id += 1;
        let id = EventId(self.next_event_id);
        trace!(event_id = %id, time = %time, ?priority, ?event, "Scheduled event");
        self.pending.insert(id);
        self.events.push(EventEntry {
            id,
            time,
            priority,
            component: component.id(),
            inner: Box::new(event),
        });
        id
    }

    /// Cancels a pending event. Returns `false` (and does nothing) if the
    /// event already ran, was already canceled, or never existed.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.pending.remove(&id) {
            self.canceled.insert(id);
            trace!(event_id = %id, "Canceled event");
            true
        } else {
            false
        }
    }

    /// Whether `id` is still waiting to run.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.clock.get()
    }

    /// Returns a structure with immutable access to the simulation time.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        ClockRef {
            clock: Rc::clone(&self.clock),
        }
    }

    /// Number of events still waiting to run.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn discard_canceled_front(&mut self) {
        while self
            .events
            .peek()
            .is_some_and(|entry| self.canceled.contains(&entry.id))
        {
            if let Some(entry) = self.events.pop() {
                self.canceled.remove(&entry.id);
            }
        }
    }

    /// Returns a reference to the next live event or `None` if none are left.
    pub fn peek(&mut self) -> Option<&EventEntry> {
        self.discard_canceled_front();
        self.events.peek()
    }

    /// Removes and returns the next live event, advancing the clock to its time.
    pub fn pop(&mut self) -> Option<EventEntry> {
        self.discard_canceled_front();
        let entry = self.events.pop()?;
        self.pending.remove(&entry.id);
        self.clock.set(entry.time);
        Some(entry)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Eq, PartialEq)]
    struct EventA(u32);

    fn key() -> Key<EventA> {
        Key::new_with_id(Uuid::from_u128(1))
    }

    fn drain(scheduler: &mut Scheduler) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(entry) = scheduler.pop() {
            out.push(entry.downcast::<EventA>().unwrap().event.0);
        }
        out
    }

    #[test]
    fn test_clock_advances_on_pop() {
        let mut scheduler = Scheduler::default();
        let clock = scheduler.clock();
        scheduler.schedule(SimTime::from_secs(2), key(), EventA(1));
        scheduler.schedule_now(key(), EventA(0));
        assert_eq!(clock.time(), SimTime::zero());

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.downcast::<EventA>().unwrap().event, &EventA(0));
        assert_eq!(clock.time(), SimTime::zero());

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.time(), SimTime::from_secs(2));
        assert_eq!(clock.time(), SimTime::from_secs(2));
        assert!(scheduler.pop().is_none());
    }

    #[test]
    fn test_total_order_time_priority_insertion() {
        let mut scheduler = Scheduler::default();
        let t = SimTime::from_millis(5);
        scheduler.schedule_with_priority(t, Priority::Normal, key(), EventA(3));
        scheduler.schedule_with_priority(t, Priority::Normal, key(), EventA(4));
        scheduler.schedule_with_priority(t, Priority::VeryHigh, key(), EventA(1));
        scheduler.schedule_with_priority(t, Priority::High, key(), EventA(2));
        scheduler.schedule_with_priority(SimTime::from_millis(1), Priority::Low, key(), EventA(0));
        scheduler.schedule_with_priority(t, Priority::Low, key(), EventA(5));
        assert_eq!(drain(&mut scheduler), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_cancel_is_noop_after_execution() {
        let mut scheduler = Scheduler::default();
        let a = scheduler.schedule_now(key(), EventA(0));
        let b = scheduler.schedule(SimTime::from_secs(1), key(), EventA(1));
        let c = scheduler.schedule(SimTime::from_secs(2), key(), EventA(2));

        assert!(scheduler.pop().is_some());
        assert!(!scheduler.cancel(a));
        assert!(scheduler.cancel(b));
        assert!(!scheduler.cancel(b));
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_pending(c));
        assert_eq!(scheduler.peek().map(EventEntry::id), Some(c));
        assert_eq!(drain(&mut scheduler), vec![2]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_schedule_at_rejects_past() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(SimTime::from_secs(3), key(), EventA(0));
        scheduler.pop();
        let err = scheduler
            .schedule_at(SimTime::from_secs(1), Priority::Normal, key(), EventA(1))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::ScheduleInPast { .. }));
        assert!(scheduler
            .schedule_at(SimTime::from_secs(3), Priority::Normal, key(), EventA(2))
            .is_ok());
    }

    #[test]
    fn test_event_entry_downcast() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule_now(key(), EventA(7));
        let entry = scheduler.pop().unwrap();
        assert!(entry.downcast::<EventA>().is_some());
        assert!(entry.downcast::<i32>().is_none());
    }
}
