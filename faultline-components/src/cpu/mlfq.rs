use super::{admit, CpuProcess, CpuProcessScheduler, CpuSlice};
use faultline_core::InvariantViolation;
use std::collections::VecDeque;

/// Multi-level feedback queue.
///
/// Level 0 has the highest priority and the shortest quantum; the quantum
/// doubles with every level. New processes enter level 0. A process that
/// uses up its whole quantum without finishing drops one level (the last
/// level keeps it). Selection always drains the highest non-empty level first.
#[derive(Debug)]
pub struct MlfqScheduler {
    base_quantum: u64,
    levels: Vec<VecDeque<CpuProcess>>,
    preempted: Option<CpuProcess>,
    demand: u64,
}

impl MlfqScheduler {
    /// `levels` must be positive; [`SchedulerPolicy`](super::SchedulerPolicy)
    /// validates this before building.
    pub fn new(levels: usize, base_quantum: u64) -> Self {
        Self {
            base_quantum,
            levels: (0..levels.max(1)).map(|_| VecDeque::new()).collect(),
            preempted: None,
            demand: 0,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn quantum_at(&self, level: usize) -> u64 {
        self.base_quantum << level.min(self.levels.len() - 1)
    }

    /// Number of processes waiting at `level`.
    pub fn level_len(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, VecDeque::len)
    }

    fn demote(&mut self, mut process: CpuProcess) {
        let level = (process.level() + 1).min(self.levels.len() - 1);
        process.set_level(level);
        self.levels[level].push_back(process);
    }

    fn settle_preempted(&mut self) {
        if let Some(process) = self.preempted.take() {
            self.demote(process);
        }
    }

    fn pop_highest(&mut self) -> Result<CpuProcess, InvariantViolation> {
        self.settle_preempted();
        self.levels
            .iter_mut()
            .find_map(VecDeque::pop_front)
            .ok_or(InvariantViolation::EmptyQueue("mlfq"))
    }
}

impl CpuProcessScheduler for MlfqScheduler {
    fn policy_name(&self) -> &'static str {
        "mlfq"
    }

    fn enter_process(&mut self, mut process: CpuProcess) -> Result<(), InvariantViolation> {
        admit(self.policy_name(), &process)?;
        self.demand += process.remaining_demand();
        process.set_level(0);
        self.levels[0].push_back(process);
        Ok(())
    }

    fn retrieve_next_process(&mut self) -> Result<CpuSlice, InvariantViolation> {
        let mut process = self.pop_highest()?;
        let work = process.consume(self.quantum_at(process.level()));
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
        let process = self.pop_highest()?;
        self.demand -= process.remaining_demand();
        let quantum = self.quantum_at(process.level());
        Ok((process, quantum))
    }

    /// A process coming back unfinished has used its full quantum, so it drops a level.
    fn requeue_process(&mut self, process: CpuProcess) -> Result<(), InvariantViolation> {
        admit(self.policy_name(), &process)?;
        self.demand += process.remaining_demand();
        self.demote(process);
        Ok(())
    }

    fn total_work_demand(&self) -> u64 {
        self.demand
    }

    fn drain(&mut self) -> Vec<CpuProcess> {
        self.settle_preempted();
        self.demand = 0;
        self.levels.iter_mut().flat_map(|level| level.drain(..)).collect()
    }

    fn size(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum::<usize>() + usize::from(self.preempted.is_some())
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
    fn quanta_double_per_level() {
        let mlfq = MlfqScheduler::new(3, 2);
        assert_eq!(mlfq.level_count(), 3);
        assert_eq!(
            (mlfq.quantum_at(0), mlfq.quantum_at(1), mlfq.quantum_at(2)),
            (2, 4, 8)
        );
        assert_eq!(mlfq.quantum_at(7), 8);
    }

    #[test]
    fn long_process_sinks_and_short_ones_overtake_it() {
        let mut mlfq = MlfqScheduler::new(3, 1);
        mlfq.enter_process(process(1, 10)).unwrap();

        // Level 0, quantum 1.
        let slice = mlfq.retrieve_next_process().unwrap();
        assert_eq!((slice.process, slice.work), (ProcessId(1), 1));

        mlfq.enter_process(process(2, 1)).unwrap();
        let slice = mlfq.retrieve_next_process().unwrap();
        assert_eq!((slice.process, slice.finished), (ProcessId(2), true));
        assert_eq!(mlfq.level_len(1), 1);

        // Level 1, quantum 2; then level 2 (the floor), quantum 4.
        assert_eq!(mlfq.retrieve_next_process().unwrap().work, 2);
        assert_eq!(mlfq.retrieve_next_process().unwrap().work, 4);
        let last = mlfq.retrieve_next_process().unwrap();
        assert_eq!((last.work, last.finished), (3, true));
        assert_eq!(mlfq.size(), 0);
        assert_eq!(mlfq.total_work_demand(), 0);
    }

    #[test]
    fn requeue_demotes() {
        let mut mlfq = MlfqScheduler::new(2, 3);
        mlfq.enter_process(process(1, 10)).unwrap();
        let (mut p, quantum) = mlfq.retrieve_next_process_no_reschedule().unwrap();
        assert_eq!(quantum, 3);
        p.consume(quantum);
        mlfq.requeue_process(p).unwrap();
        assert_eq!(mlfq.level_len(1), 1);
        assert_eq!(mlfq.total_work_demand(), 7);

        let (p, quantum) = mlfq.retrieve_next_process_no_reschedule().unwrap();
        assert_eq!((p.level(), quantum), (1, 6));
    }

    #[test]
    fn drain_includes_preempted_process() {
        let mut mlfq = MlfqScheduler::new(2, 1);
        mlfq.enter_process(process(1, 5)).unwrap();
        mlfq.enter_process(process(2, 5)).unwrap();
        mlfq.retrieve_next_process().unwrap();
        let mut ids: Vec<_> = mlfq.drain().into_iter().map(|p| p.id().0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(mlfq.size(), 0);
    }
}
