use crate::{SimError, SimTime, Simulation};

/// Simulation execution trait.
pub trait Execute {
    /// Executes the simulation until some stopping condition is reached.
    /// The condition is implementation-specific.
    fn execute(self, sim: &mut Simulation) -> Result<(), SimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndCondition {
    Time(SimTime),
    NoEvents,
    Steps(usize),
}

/// Executor is used for simple execution of an entire simulation.
///
/// See the crate level documentation for examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    end_condition: EndCondition,
}

impl Executor {
    /// Simulation will end only once there is no available events in the queue.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            end_condition: EndCondition::NoEvents,
        }
    }

    /// Runs every event scheduled at or before `time`.
    /// It may terminate early if no events are available.
    #[must_use]
    pub fn timed(time: SimTime) -> Self {
        Self {
            end_condition: EndCondition::Time(time),
        }
    }

    /// Simulation will execute exactly this many steps, unless we run out of events.
    #[must_use]
    pub fn steps(steps: usize) -> Self {
        Self {
            end_condition: EndCondition::Steps(steps),
        }
    }

    /// Runs until `predicate` returns `true` (checked before every step) or
    /// the queue drains.
    #[must_use]
    pub fn until<P>(predicate: P) -> ExecutorUntil<P>
    where
        P: FnMut(&Simulation) -> bool,
    {
        ExecutorUntil { predicate }
    }

    /// Registers a side effect that is called _after_ each simulation step.
    #[must_use]
    pub fn side_effect<F>(self, func: F) -> ExecutorWithSideEffect<F>
    where
        F: FnMut(&Simulation),
    {
        ExecutorWithSideEffect {
            end_condition: self.end_condition,
            side_effect: func,
        }
    }
}

impl Execute for Executor {
    fn execute(self, sim: &mut Simulation) -> Result<(), SimError> {
        run_with(sim, self.end_condition, |_| {})
    }
}

pub struct ExecutorWithSideEffect<F>
where
    F: FnMut(&Simulation),
{
    end_condition: EndCondition,
    side_effect: F,
}

impl<F> Execute for ExecutorWithSideEffect<F>
where
    F: FnMut(&Simulation),
{
    fn execute(self, sim: &mut Simulation) -> Result<(), SimError> {
        run_with(sim, self.end_condition, self.side_effect)
    }
}

pub struct ExecutorUntil<P>
where
    P: FnMut(&Simulation) -> bool,
{
    predicate: P,
}

impl<P> Execute for ExecutorUntil<P>
where
    P: FnMut(&Simulation) -> bool,
{
    fn execute(mut self, sim: &mut Simulation) -> Result<(), SimError> {
        while !(self.predicate)(sim) {
            if !sim.step()? {
                break;
            }
        }
        Ok(())
    }
}

fn run_with<F>(sim: &mut Simulation, end_condition: EndCondition, mut side_effect: F) -> Result<(), SimError>
where
    F: FnMut(&Simulation),
{
    let mut step = |sim: &mut Simulation| -> Result<bool, SimError> {
        let stepped = sim.step()?;
        if stepped {
            side_effect(sim);
        }
        Ok(stepped)
    };
    match end_condition {
        EndCondition::Time(time) => {
            while sim.peek_next_event_time().is_some_and(|t| t <= time) {
                step(sim)?;
            }
        }
        EndCondition::NoEvents => while step(sim)? {},
        EndCondition::Steps(steps) => {
            for _ in 0..steps {
                if !step(sim)? {
                    break;
                }
            }
        }
    }
    Ok(())
}
