//! Error types for the simulation engine
//!
//! Two families exist. [`ConfigurationError`] is raised while building the
//! model, before any event runs. [`InvariantViolation`] signals an internal
//! consistency defect during a run and aborts it. Outcomes that a request's
//! listeners can react to (an instance being killed, a timeout) are data, not
//! errors, and never show up here.

use crate::{EventId, SimTime};
use thiserror::Error;

/// Top-level error type for simulation operations
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Event {event} at {time} failed: {source}")]
    EventFailed {
        event: EventId,
        time: SimTime,
        #[source]
        source: Box<SimError>,
    },
}

/// Malformed or inconsistent input, detected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("probability must be within [0, 1], got {0}")]
    ProbabilityOutOfRange(f64),

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    #[error("unknown microservice '{0}'")]
    UnknownService(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    #[error("Invalid configuration: {0}")]
    Other(String),
}

/// Internal consistency defects. These are fatal for the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("retrieval from an empty {0} scheduler queue")]
    EmptyQueue(&'static str),

    #[error("process admitted with non-positive remaining demand ({0})")]
    NonPositiveDemand(u64),

    #[error("cannot schedule an event in the past (now {now}, requested {requested})")]
    ScheduleInPast { now: SimTime, requested: SimTime },

    #[error("no non-negative sample after {attempts} draws from {distribution}")]
    SamplingExhausted { distribution: String, attempts: u32 },

    #[error("event for unknown component {0}")]
    UnknownComponent(String),

    #[error("unknown {kind} id {id}")]
    UnknownEntity { kind: &'static str, id: u64 },

    #[error("{0}")]
    Inconsistent(String),
}

pub type SimResult<T> = Result<T, SimError>;
