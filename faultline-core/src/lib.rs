//! Core discrete event simulation engine.
//!
//! This crate provides the domain-agnostic building blocks of a simulation
//! run: the logical clock and event queue, component dispatch, run control,
//! seeded sampling and the error taxonomy.
//!
//! # Architecture Overview
//!
//! - [`Simulation`]: owns the [`Scheduler`] and the registered components,
//!   and executes events one at a time.
//! - [`Component`]: a state machine that receives the events addressed to its
//!   [`Key`] and may schedule further events.
//! - [`SimRng`]: the single seeded generator of a run. Components that need
//!   randomness own it (or borrow it) explicitly; nothing reaches for global
//!   state.
//!
//! # Execution model
//!
//! Execution is single-threaded and cooperative. Exactly one event runs at a
//! time; a handler never blocks, it schedules a future event and returns.
//! Events sharing a timestamp run by [`Priority`] (highest first) and then in
//! insertion order, so a fixed seed and input replay identically.
//!
//! ```rust
//! use faultline_core::{Component, Execute, Executor, Key, Scheduler, SimError, SimTime, Simulation};
//!
//! #[derive(Debug)]
//! struct Tick;
//!
//! struct Counter(u32);
//!
//! impl Component for Counter {
//!     type Event = Tick;
//!
//!     fn process_event(&mut self, me: Key<Tick>, _: &Tick, scheduler: &mut Scheduler) -> Result<(), SimError> {
//!         self.0 += 1;
//!         if self.0 < 3 {
//!             scheduler.schedule(SimTime::from_secs(1), me, Tick);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut sim = Simulation::default();
//! let key = sim.add_component(Counter(0));
//! sim.schedule(SimTime::zero(), key, Tick);
//! sim.execute(Executor::unbound()).unwrap();
//! assert_eq!(sim.time(), SimTime::from_secs(2));
//! ```

pub mod dists;
pub mod error;
pub mod execute;
pub mod ids;
pub mod logging;
pub mod randomness;
pub mod scheduler;
pub mod time;
pub mod types;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

pub use dists::{DistributionConfig, Sampler};
pub use error::{ConfigurationError, InvariantViolation, SimError, SimResult};
pub use execute::{Execute, Executor};
pub use logging::{
    component_span, event_span, init_detailed_simulation_logging, init_simulation_logging,
    init_simulation_logging_with_level, simulation_span,
};
pub use randomness::SimRng;
pub use scheduler::{ClockRef, EventEntry, Scheduler};
pub use time::SimTime;
pub use types::{EventId, Priority};

/// Run-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Determines every random draw of the run and the component id stream.
    pub seed: u64,
}

impl SimulationConfig {
    /// The generator every sampler and load balancer of this run draws from.
    pub fn rng(&self) -> SimRng {
        SimRng::new(self.seed)
    }
}

/// Typed address of a registered component.
pub struct Key<T> {
    id: Uuid,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Key<T> {
    pub fn new_with_id(id: Uuid) -> Self {
        Self {
            id,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the UUID of this key
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.id)
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for Key<T> {}

pub trait ProcessEventEntry: Any {
    fn process_event_entry(&mut self, entry: &EventEntry, scheduler: &mut Scheduler) -> Result<(), SimError>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// A state machine driven by events addressed to its key.
///
/// Returning an error aborts the run: errors here are defects or broken
/// configuration, never outcomes a simulated request can recover from.
pub trait Component: ProcessEventEntry {
    type Event: 'static;

    fn process_event(
        &mut self,
        self_id: Key<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
    ) -> Result<(), SimError>;
}

impl<E, C> ProcessEventEntry for C
where
    E: fmt::Debug + 'static,
    C: Component<Event = E> + 'static,
{
    fn process_event_entry(&mut self, entry: &EventEntry, scheduler: &mut Scheduler) -> Result<(), SimError> {
        let typed = entry.downcast::<E>().ok_or_else(|| {
            InvariantViolation::Inconsistent(format!(
                "event {} is not a {}",
                entry.id(),
                std::any::type_name::<E>()
            ))
        })?;
        self.process_event(typed.component_key, typed.event, scheduler)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Container holding type-erased components.
pub struct Components {
    seed: u64,
    next_id: u64,
    components: HashMap<Uuid, Box<dyn ProcessEventEntry>>,
}

impl Components {
    fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            next_id: 0,
            components: HashMap::new(),
        }
    }

    /// Process the event on the component given by the event entry.
    pub fn process_event_entry(&mut self, entry: &EventEntry, scheduler: &mut Scheduler) -> Result<(), SimError> {
        let component = self
            .components
            .get_mut(&entry.component)
            .ok_or_else(|| InvariantViolation::UnknownComponent(entry.component.to_string()))?;
        component.process_event_entry(entry, scheduler)
    }

    /// Registers a new component and returns its ID.
    #[must_use]
    pub fn register<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(&mut self, component: C) -> Key<E> {
        self.next_id += 1;
        let id = ids::deterministic_uuid(self.seed, ids::UUID_DOMAIN_COMPONENT, self.next_id);
        self.components.insert(id, Box::new(component));
        Key::new_with_id(id)
    }

    pub fn remove<E: 'static, C: Component<Event = E> + 'static>(&mut self, key: Key<E>) -> Option<C> {
        self.components
            .remove(&key.id)
            .and_then(|boxed_trait| boxed_trait.into_any().downcast::<C>().ok())
            .map(|boxed_c| *boxed_c)
    }

    /// Get mutable access to a component
    pub fn get_component_mut<E: 'static, C: Component<Event = E> + 'static>(&mut self, key: Key<E>) -> Option<&mut C> {
        self.components
            .get_mut(&key.id)
            .and_then(|boxed_trait| boxed_trait.as_any_mut().downcast_mut::<C>())
    }
}

/// Simulation struct that puts the scheduler and the components together.
///
/// See the [crate-level documentation](index.html) for more information.
pub struct Simulation {
    config: SimulationConfig,
    scheduler: Scheduler,
    /// Component container.
    pub components: Components,
    events_processed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            scheduler: Scheduler::default(),
            components: Components::with_seed(config.seed),
            events_processed: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.scheduler.time()
    }

    /// Returns a ClockRef for reading the simulation time.
    pub fn clock(&self) -> ClockRef {
        self.scheduler.clock()
    }

    /// Number of events executed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Direct access to the event queue, e.g. to seed initial events.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Performs one step of the simulation. Returns `Ok(true)` if an event was
    /// processed and `Ok(false)` if the queue was empty. A handler error is
    /// returned with the failing event attached and leaves the run aborted.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(entry) = self.scheduler.pop() else {
            return Ok(false);
        };
        let span = event_span(entry.id(), entry.time());
        let _entered = span.enter();
        trace!(
            event_id = %entry.id(),
            event_time = %entry.time(),
            priority = ?entry.priority(),
            "Processing simulation step"
        );
        self.events_processed += 1;
        self.components
            .process_event_entry(&entry, &mut self.scheduler)
            .map_err(|source| SimError::EventFailed {
                event: entry.id(),
                time: entry.time(),
                source: Box::new(source),
            })?;
        Ok(true)
    }

    /// Runs the simulation until the executor's stopping condition holds.
    ///
    /// See [`Execute`] and [`Executor`] for more details.
    #[instrument(skip(self, executor), fields(seed = self.config.seed, initial_time = %self.time()))]
    pub fn execute<E: Execute>(&mut self, executor: E) -> Result<(), SimError> {
        info!("Starting simulation execution");
        let result = executor.execute(self);
        match &result {
            Ok(()) => info!(
                final_time = %self.time(),
                events_processed = self.events_processed,
                "Simulation execution completed"
            ),
            Err(error) => warn!(%error, final_time = %self.time(), "Simulation aborted"),
        }
        result
    }

    /// Adds a new component.
    #[must_use]
    #[instrument(skip(self, component), fields(component_type = std::any::type_name::<C>()))]
    pub fn add_component<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(&mut self, component: C) -> Key<E> {
        let key = self.components.register(component);
        debug!(component_id = %key.id(), "Added component to simulation");
        key
    }

    /// Remove a component: usually at the end of the simulation to peek at the state
    #[must_use]
    pub fn remove_component<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(&mut self, key: Key<E>) -> Option<C> {
        let result = self.components.remove(key);
        if result.is_none() {
            warn!(component_id = %key.id(), "Attempted to remove non-existent component");
        }
        result
    }

    /// Get mutable access to a component
    pub fn get_component_mut<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(
        &mut self,
        key: Key<E>,
    ) -> Option<&mut C> {
        self.components.get_component_mut(key)
    }

    /// Schedules a new event to be executed `delay` from now in component `component`.
    pub fn schedule<E: fmt::Debug + 'static>(&mut self, delay: SimTime, component: Key<E>, event: E) -> EventId {
        self.scheduler.schedule(delay, component, event)
    }

    /// Schedules an event at an absolute time with an explicit priority.
    pub fn schedule_at<E: fmt::Debug + 'static>(
        &mut self,
        time: SimTime,
        priority: Priority,
        component: Key<E>,
        event: E,
    ) -> Result<EventId, SimError> {
        Ok(self.scheduler.schedule_at(time, priority, component, event)?)
    }

    /// Cancels a pending event; no-op if it already ran.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Returns the time of the next scheduled event, or None if no events are scheduled.
    pub fn peek_next_event_time(&mut self) -> Option<SimTime> {
        self.scheduler.peek().map(EventEntry::time)
    }

    /// Check if there are pending events
    pub fn has_pending_events(&self) -> bool {
        !self.scheduler.is_empty()
    }
}
