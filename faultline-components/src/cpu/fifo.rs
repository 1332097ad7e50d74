use super::{admit, CpuProcess, CpuProcessScheduler, CpuSlice};
use faultline_core::InvariantViolation;
use std::collections::VecDeque;

/// Runs each process to completion in arrival order.
#[derive(Debug, Default)]
pub struct FifoScheduler {
    queue: VecDeque<CpuProcess>,
    demand: u64,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CpuProcessScheduler for FifoScheduler {
    fn policy_name(&self) -> &'static str {
        "fifo"
    }

    fn enter_process(&mut self, process: CpuProcess) -> Result<(), InvariantViolation> {
        admit(self.policy_name(), &process)?;
        self.demand += process.remaining_demand();
        self.queue.push_back(process);
        Ok(())
    }

    fn retrieve_next_process(&mut self) -> Result<CpuSlice, InvariantViolation> {
        let (mut process, quantum) = self.retrieve_next_process_no_reschedule()?;
        let work = process.consume(quantum);
        Ok(CpuSlice {
            process: process.id(),
            request: process.request(),
            work,
            finished: process.is_finished(),
        })
    }

    fn retrieve_next_process_no_reschedule(&mut self) -> Result<(CpuProcess, u64), InvariantViolation> {
        let process = self
            .queue
            .pop_front()
            .ok_or(InvariantViolation::EmptyQueue("fifo"))?;
        let quantum = process.remaining_demand();
        self.demand -= quantum;
        Ok((process, quantum))
    }

    fn total_work_demand(&self) -> u64 {
        self.demand
    }

    fn drain(&mut self) -> Vec<CpuProcess> {
        self.demand = 0;
        self.queue.drain(..).collect()
    }

    fn size(&self) -> usize {
        self.queue.len()
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
    fn runs_to_completion_in_arrival_order() {
        let mut fifo = FifoScheduler::new();
        fifo.enter_process(process(1, 5)).unwrap();
        fifo.enter_process(process(2, 3)).unwrap();
        assert_eq!(fifo.total_work_demand(), 8);

        let first = fifo.retrieve_next_process().unwrap();
        assert_eq!((first.process, first.work, first.finished), (ProcessId(1), 5, true));
        assert_eq!(fifo.total_work_demand(), 3);

        let (second, quantum) = fifo.retrieve_next_process_no_reschedule().unwrap();
        assert_eq!((second.id(), quantum), (ProcessId(2), 3));
        assert_eq!(fifo.size(), 0);
        assert_eq!(fifo.total_work_demand(), 0);
    }

    #[test]
    fn drain_empties_queue() {
        let mut fifo = FifoScheduler::new();
        fifo.enter_process(process(1, 5)).unwrap();
        fifo.enter_process(process(2, 3)).unwrap();
        let drained: Vec<_> = fifo.drain().into_iter().map(|p| p.id()).collect();
        assert_eq!(drained, vec![ProcessId(1), ProcessId(2)]);
        assert!(!fifo.has_threads_to_schedule());
        assert_eq!(fifo.total_work_demand(), 0);
    }
}
