//! Microservice instances
//!
//! An instance owns one CPU scheduler and a fixed number of threads. Each
//! busy thread runs one burst at a time; a burst is a slice of work handed
//! out by the scheduler whose completion is a future event.
//!
//! With a single thread the scheduler re-queues preempted processes on its
//! own. With several threads the instance takes processes out with
//! [`CpuProcessScheduler::retrieve_next_process_no_reschedule`] and hands
//! unfinished ones back itself, so two threads never race over one process.

use crate::architecture::{Microservice, ServiceId};
use crate::cpu::{work_duration, CpuProcess, CpuProcessScheduler};
use crate::request::RequestId;
use faultline_core::{ConfigurationError, EventId, InvariantViolation, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Starting,
    Running,
    Killed,
}

#[derive(Debug)]
struct Burst {
    request: RequestId,
    work: u64,
    finished: bool,
    /// Present only when the thread took the process out of the scheduler.
    held: Option<CpuProcess>,
    event: Option<EventId>,
}

/// A burst that has just started on `thread` and ends after `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedBurst {
    pub thread: usize,
    pub request: RequestId,
    pub duration: SimTime,
}

/// What was running or waiting on an instance when it was killed.
#[derive(Debug, Default)]
pub struct KilledWork {
    /// Requests whose CPU work was aborted, without duplicates.
    pub requests: Vec<RequestId>,
    /// Pending burst completions that must not run.
    pub burst_events: Vec<EventId>,
}

pub struct MicroserviceInstance {
    id: InstanceId,
    service: ServiceId,
    state: InstanceState,
    capacity: u64,
    scheduler: Box<dyn CpuProcessScheduler>,
    threads: Vec<Option<Burst>>,
}

impl fmt::Debug for MicroserviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroserviceInstance")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("state", &self.state)
            .field("queued", &self.scheduler.size())
            .field("busy_threads", &self.busy_threads())
            .finish()
    }
}

impl MicroserviceInstance {
    pub fn new(id: InstanceId, service: &Microservice, state: InstanceState) -> Result<Self, ConfigurationError> {
        Ok(Self {
            id,
            service: service.id(),
            state,
            capacity: service.capacity(),
            scheduler: service.scheduler().build()?,
            threads: (0..service.threads()).map(|_| None).collect(),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Moves a starting instance to running. Returns `false` if it was not starting.
    pub fn start(&mut self) -> bool {
        if self.state == InstanceState::Starting {
            self.state = InstanceState::Running;
            true
        } else {
            false
        }
    }

    pub fn busy_threads(&self) -> usize {
        self.threads.iter().filter(|t| t.is_some()).count()
    }

    /// Processes waiting in the scheduler.
    pub fn queued(&self) -> usize {
        self.scheduler.size()
    }

    /// Remaining demand in the scheduler plus everything held by busy
    /// threads: the work of each burst in flight and, for processes taken out
    /// of the scheduler, what they still need after it.
    pub fn total_work_demand(&self) -> u64 {
        let in_flight: u64 = self
            .threads
            .iter()
            .flatten()
            .map(|burst| burst.work + burst.held.as_ref().map_or(0, CpuProcess::remaining_demand))
            .sum();
        self.scheduler.total_work_demand() + in_flight
    }

    /// Total work demand divided by the work the instance completes per second.
    pub fn relative_work_demand(&self) -> f64 {
        let throughput = self.capacity as f64 * self.threads.len() as f64;
        self.total_work_demand() as f64 / throughput
    }

    pub fn admit(&mut self, process: CpuProcess) -> Result<(), InvariantViolation> {
        trace!(instance = %self.id, process = %process.id(), demand = process.total_demand(), "Admitted process");
        self.scheduler.enter_process(process)
    }

    /// Starts a burst on every idle thread while there is work.
    pub fn start_bursts(&mut self) -> Result<Vec<StartedBurst>, InvariantViolation> {
        let mut started = Vec::new();
        if !self.is_running() {
            return Ok(started);
        }
        let single_thread = self.threads.len() == 1;
        for thread in 0..self.threads.len() {
            if self.threads[thread].is_some() || !self.scheduler.has_threads_to_schedule() {
                continue;
            }
            let burst = if single_thread {
                let slice = self.scheduler.retrieve_next_process()?;
                Burst {
                    request: slice.request,
                    work: slice.work,
                    finished: slice.finished,
                    held: None,
                    event: None,
                }
            } else {
                let (mut process, quantum) = self.scheduler.retrieve_next_process_no_reschedule()?;
                let work = process.consume(quantum);
                Burst {
                    request: process.request(),
                    work,
                    finished: process.is_finished(),
                    held: Some(process),
                    event: None,
                }
            };
            let duration = work_duration(burst.work, self.capacity);
            trace!(instance = %self.id, thread, request = %burst.request, work = burst.work, %duration, "Burst started");
            started.push(StartedBurst {
                thread,
                request: burst.request,
                duration,
            });
            self.threads[thread] = Some(burst);
        }
        Ok(started)
    }

    /// Remembers the completion event of the burst on `thread`, so a kill can cancel it.
    pub fn attach_event(&mut self, thread: usize, event: EventId) {
        if let Some(Some(burst)) = self.threads.get_mut(thread) {
            burst.event = Some(event);
        }
    }

    /// Ends the burst on `thread`. Returns the request whose CPU work is now
    /// done, if the burst finished its process.
    pub fn complete_burst(&mut self, thread: usize) -> Result<Option<RequestId>, InvariantViolation> {
        let burst = self
            .threads
            .get_mut(thread)
            .and_then(Option::take)
            .ok_or_else(|| InvariantViolation::Inconsistent(format!("{} thread {thread} has no burst", self.id)))?;
        if let Some(process) = burst.held {
            if !process.is_finished() {
                self.scheduler.requeue_process(process)?;
            }
        }
        Ok(burst.finished.then_some(burst.request))
    }

    /// Marks the instance killed and strips it of all work.
    pub fn kill(&mut self) -> KilledWork {
        self.state = InstanceState::Killed;
        let mut killed = KilledWork::default();
        for burst in self.threads.iter_mut().filter_map(Option::take) {
            killed.burst_events.extend(burst.event);
            if !killed.requests.contains(&burst.request) {
                killed.requests.push(burst.request);
            }
        }
        for process in self.scheduler.drain() {
            if !killed.requests.contains(&process.request()) {
                killed.requests.push(process.request());
            }
        }
        killed
    }
}
