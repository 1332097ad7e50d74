use crate::request::RequestId;
use faultline_core::SimTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({})", self.0)
    }
}

/// CPU-bound work a request incurs at one instance, measured in abstract
/// work units.
///
/// A process is moved between scheduler queues, never copied, so it has no
/// `Clone` impl.
#[derive(Debug, PartialEq, Eq)]
pub struct CpuProcess {
    id: ProcessId,
    request: RequestId,
    total_demand: u64,
    remaining: u64,
    arrival: SimTime,
    level: usize,
}

impl CpuProcess {
    pub fn new(id: ProcessId, request: RequestId, demand: u64, arrival: SimTime) -> Self {
        Self {
            id,
            request,
            total_demand: demand,
            remaining: demand,
            arrival,
            level: 0,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn total_demand(&self) -> u64 {
        self.total_demand
    }

    pub fn remaining_demand(&self) -> u64 {
        self.remaining
    }

    pub fn arrival(&self) -> SimTime {
        self.arrival
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Feedback level, only meaningful to multi-level schedulers.
    pub fn level(&self) -> usize {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    /// Deducts up to `quantum` units and returns how many were actually consumed.
    pub fn consume(&mut self, quantum: u64) -> u64 {
        let work = quantum.min(self.remaining);
        self.remaining -= work;
        work
    }
}
