use super::{admit, CpuProcess, CpuProcessScheduler, CpuSlice};
use faultline_core::InvariantViolation;
use std::collections::VecDeque;

/// Fixed-quantum round robin.
///
/// The process served by the last [`retrieve_next_process`] call is kept
/// aside and appended to the tail at the start of the next retrieval, which
/// puts it behind every process that arrived during its burst.
///
/// [`retrieve_next_process`]: CpuProcessScheduler::retrieve_next_process
#[derive(Debug)]
pub struct RoundRobinScheduler {
    quantum: u64,
    queue: VecDeque<CpuProcess>,
    preempted: Option<CpuProcess>,
    demand: u64,
}

impl RoundRobinScheduler {
    pub fn new(quantum: u64) -> Self {
        Self {
            quantum,
            queue: VecDeque::new(),
            preempted: None,
            demand: 0,
        }
    }

    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    fn settle_preempted(&mut self) {
        if let Some(process) = self.preempted.take() {
            self.queue.push_back(process);
        }
    }
}

impl CpuProcessScheduler for RoundRobinScheduler {
    fn policy_name(&self) -> &'static str {
        "round_robin"
    }

    fn enter_process(&mut self, process: CpuProcess) -> Result<(), InvariantViolation> {
        admit(self.policy_name(), &process)?;
        self.demand += process.remaining_demand();
        self.queue.push_back(process);
        Ok(())
    }

    fn retrieve_next_process(&mut self) -> Result<CpuSlice, InvariantViolation> {
        self.settle_preempted();
        let mut process = self
            .queue
            .pop_front()
            .ok_or(InvariantViolation::EmptyQueue("round_robin"))?;
        let work = process.consume(self.quantum);
        self.demand -= work;
        let slice = CpuSlice {
            process: process.id(),
            request: process.request(),
            work,
            finished: process.is_finished(),
        };
        if !slice.finished {
            self.preempted = Some(process);
        }
        Ok(slice)
    }

    fn retrieve_next_process_no_reschedule(&mut self) -> Result<(CpuProcess, u64), InvariantViolation> {
        self.settle_preempted();
        let process = self
            .queue
            .pop_front()
            .ok_or(InvariantViolation::EmptyQueue("round_robin"))?;
        self.demand -= process.remaining_demand();
        Ok((process, self.quantum))
    }

    fn total_work_demand(&self) -> u64 {
        self.demand
    }

    fn drain(&mut self) -> Vec<CpuProcess> {
        self.settle_preempted();
        self.demand = 0;
        self.queue.drain(..).collect()
    }

    fn size(&self) -> usize {
        self.queue.len() + usize::from(self.preempted.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::ProcessId;
    use crate::request::RequestId;
    use faultline_core::SimTime;

    fn process(id: u64, demand: u64) -> CpuProcess {
        CpuProcess::new(ProcessId(id), RequestId(id), demand, SimTime::zero())
    }

    #[test]
    fn classic_round_robin_order() {
        let mut rr = RoundRobinScheduler::new(2);
        for (id, demand) in [(1, 5), (2, 3), (3, 8)] {
            rr.enter_process(process(id, demand)).unwrap();
        }
        assert_eq!(rr.total_work_demand(), 16);

        let mut clock = 0;
        let mut completions = Vec::new();
        while rr.has_threads_to_schedule() {
            let slice = rr.retrieve_next_process().unwrap();
            clock += slice.work;
            if slice.finished {
                completions.push((slice.process.0, clock));
            }
        }
        assert_eq!(completions, vec![(2, 9), (1, 12), (3, 16)]);
        assert_eq!(rr.total_work_demand(), 0);
    }

    #[test]
    fn process_arriving_mid_burst_runs_before_preempted_one() {
        let mut rr = RoundRobinScheduler::new(2);
        rr.enter_process(process(1, 4)).unwrap();
        assert_eq!(rr.retrieve_next_process().unwrap().process, ProcessId(1));
        rr.enter_process(process(2, 1)).unwrap();
        assert_eq!(rr.size(), 2);
        assert_eq!(rr.total_work_demand(), 3);
        assert_eq!(rr.retrieve_next_process().unwrap().process, ProcessId(2));
        assert_eq!(rr.retrieve_next_process().unwrap().process, ProcessId(1));
        assert!(!rr.has_threads_to_schedule());
    }

    #[test]
    fn no_reschedule_leaves_requeue_to_caller() {
        let mut rr = RoundRobinScheduler::new(2);
        rr.enter_process(process(1, 5)).unwrap();
        let (mut p, quantum) = rr.retrieve_next_process_no_reschedule().unwrap();
        assert_eq!(quantum, 2);
        assert_eq!(rr.size(), 0);
        assert_eq!(rr.total_work_demand(), 0);

        p.consume(quantum);
        rr.requeue_process(p).unwrap();
        assert_eq!(rr.total_work_demand(), 3);
        assert_eq!(rr.size(), 1);
    }
}
