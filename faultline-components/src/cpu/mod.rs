//! CPU process scheduling for microservice instances
//!
//! Every instance owns one [`CpuProcessScheduler`] that multiplexes its
//! compute capacity among the requests it is serving. Three interchangeable
//! policies exist, selected from configuration through [`SchedulerPolicy`]:
//!
//! - [`FifoScheduler`]: each process runs to completion in arrival order.
//! - [`RoundRobinScheduler`]: fixed quantum, unfinished processes go to the tail.
//! - [`MlfqScheduler`]: several levels with growing quanta; a process that
//!   uses its whole quantum drops one level.
//!
//! Work is measured in abstract units. Converting a slice of work into
//! simulated time is the instance's job (see [`work_duration`]).
//!
//! # Example
//!
//! ```rust
//! use faultline_components::cpu::{CpuProcess, ProcessId, SchedulerPolicy};
//! use faultline_components::RequestId;
//! use faultline_core::SimTime;
//!
//! let mut scheduler = SchedulerPolicy::RoundRobin { quantum: 2 }.build().unwrap();
//! scheduler
//!     .enter_process(CpuProcess::new(ProcessId(1), RequestId(1), 5, SimTime::zero()))
//!     .unwrap();
//! let slice = scheduler.retrieve_next_process().unwrap();
//! assert_eq!(slice.work, 2);
//! assert!(!slice.finished);
//! assert_eq!(scheduler.total_work_demand(), 3);
//! ```

mod fifo;
mod mlfq;
mod process;
mod round_robin;

pub use fifo::FifoScheduler;
pub use mlfq::MlfqScheduler;
pub use process::{CpuProcess, ProcessId};
pub use round_robin::RoundRobinScheduler;

use crate::builder::validate_positive;
use crate::request::RequestId;
use faultline_core::{ConfigurationError, InvariantViolation, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One burst of CPU work handed out by [`CpuProcessScheduler::retrieve_next_process`].
///
/// The work has already been deducted from the process. If `finished` is
/// false the scheduler still owns the process and will queue it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSlice {
    pub process: ProcessId,
    pub request: RequestId,
    pub work: u64,
    pub finished: bool,
}

/// Capability shared by all CPU scheduling policies.
///
/// # Invariants
///
/// - A scheduler never holds a process whose remaining demand is zero.
/// - Each process is owned by exactly one queue at any instant.
/// - Retrieving from an empty scheduler is an [`InvariantViolation`], never a
///   sentinel value.
pub trait CpuProcessScheduler: fmt::Debug {
    /// Short policy name used in logs and errors.
    fn policy_name(&self) -> &'static str;

    /// Admits a process.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::NonPositiveDemand`] if the process has no
    /// remaining demand.
    fn enter_process(&mut self, process: CpuProcess) -> Result<(), InvariantViolation>;

    /// Picks the next process and deducts one quantum of work from it.
    ///
    /// An unfinished process stays with the scheduler. It is put back into
    /// the queue on the next retrieval, so processes admitted while its
    /// burst was running are served before it.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::EmptyQueue`] if nothing is ready.
    fn retrieve_next_process(&mut self) -> Result<CpuSlice, InvariantViolation>;

    /// Removes the next process together with its quantum, without deducting
    /// any work and without re-queueing it.
    ///
    /// Used by instances running several threads: the caller consumes the
    /// quantum and hands an unfinished process back via
    /// [`requeue_process`](Self::requeue_process).
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::EmptyQueue`] if nothing is ready.
    fn retrieve_next_process_no_reschedule(&mut self) -> Result<(CpuProcess, u64), InvariantViolation>;

    /// Returns a preempted process obtained from
    /// [`retrieve_next_process_no_reschedule`](Self::retrieve_next_process_no_reschedule).
    fn requeue_process(&mut self, process: CpuProcess) -> Result<(), InvariantViolation> {
        self.enter_process(process)
    }

    /// Whether a retrieval would succeed.
    fn has_threads_to_schedule(&self) -> bool {
        self.size() > 0
    }

    /// Sum of the remaining demand of every process the scheduler holds.
    fn total_work_demand(&self) -> u64;

    /// Removes and returns every process, in no particular order.
    fn drain(&mut self) -> Vec<CpuProcess>;

    fn clear(&mut self) {
        self.drain();
    }

    /// Number of processes held.
    fn size(&self) -> usize;
}

fn admit(policy: &'static str, process: &CpuProcess) -> Result<(), InvariantViolation> {
    if process.remaining_demand() == 0 {
        tracing::error!(policy, process = %process.id(), "Rejected process without demand");
        return Err(InvariantViolation::NonPositiveDemand(process.remaining_demand()));
    }
    Ok(())
}

/// Scheduling policy of an instance, as configured per microservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerPolicy {
    Fifo,
    RoundRobin { quantum: u64 },
    Mlfq { levels: usize, base_quantum: u64 },
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        SchedulerPolicy::RoundRobin { quantum: 10 }
    }
}

impl SchedulerPolicy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            SchedulerPolicy::Fifo => Ok(()),
            SchedulerPolicy::RoundRobin { quantum } => validate_positive("round robin quantum", quantum as f64),
            SchedulerPolicy::Mlfq { levels, base_quantum } => {
                validate_positive("mlfq levels", levels as f64)?;
                validate_positive("mlfq base quantum", base_quantum as f64)?;
                let shift = levels - 1;
                if shift >= u64::BITS as usize || (base_quantum.leading_zeros() as usize) < shift {
                    return Err(ConfigurationError::Other(format!(
                        "mlfq with {levels} levels overflows base quantum {base_quantum}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Creates a fresh, empty scheduler for one instance.
    pub fn build(&self) -> Result<Box<dyn CpuProcessScheduler>, ConfigurationError> {
        self.validate()?;
        Ok(match *self {
            SchedulerPolicy::Fifo => Box::new(FifoScheduler::new()),
            SchedulerPolicy::RoundRobin { quantum } => Box::new(RoundRobinScheduler::new(quantum)),
            SchedulerPolicy::Mlfq { levels, base_quantum } => Box::new(MlfqScheduler::new(levels, base_quantum)),
        })
    }
}

/// Simulated time needed to execute `work` units on a thread that completes
/// `capacity` units per second. Rounded up to the next nanosecond.
pub fn work_duration(work: u64, capacity: u64) -> SimTime {
    if capacity == 0 {
        return SimTime::from_nanos(u64::MAX);
    }
    let nanos = (u128::from(work) * 1_000_000_000).div_ceil(u128::from(capacity));
    SimTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
