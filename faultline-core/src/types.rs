//! Core type definitions and newtypes for the simulation engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a scheduled event.
///
/// Ids are handed out in insertion order, which makes them the final
/// tie-breaker of the event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.0)
    }
}

/// Scheduling priority among events sharing a timestamp.
///
/// Higher priorities run first. Cancellations use [`Priority::VeryHigh`] so
/// that they overtake any competing completion at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}
