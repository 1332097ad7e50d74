//! Experiments: the load and faults applied to an architecture
//!
//! An [`Experiment`] is the validated form of an [`ExperimentDescriptor`].
//! [`build_simulation`] wires it to a fresh [`ServiceMesh`] and seeds the
//! initial events: each generator's first emission, every fault injection
//! and every instance summon.

use crate::architecture::Architecture;
use crate::builder::seconds;
use crate::config::ExperimentDescriptor;
use crate::fault::{FaultInjection, InstanceSummon};
use crate::generator::LoadGenerator;
use crate::listener::SharedListener;
use crate::mesh::{MeshEvent, ServiceMesh};
use faultline_core::{
    ConfigurationError, Executor, Key, Priority, SimError, SimTime, Simulation, SimulationConfig,
};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Experiment {
    config: SimulationConfig,
    duration: Option<SimTime>,
    generators: Vec<LoadGenerator>,
    faults: Vec<FaultInjection>,
    summons: Vec<InstanceSummon>,
}

impl Experiment {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Validates every entry against `architecture`.
    pub fn from_descriptor(
        descriptor: &ExperimentDescriptor,
        architecture: &Architecture,
    ) -> Result<Self, ConfigurationError> {
        let mut experiment = Self::new(SimulationConfig { seed: descriptor.seed });
        if let Some(duration) = descriptor.duration {
            experiment.duration = Some(seconds("experiment duration", duration)?);
        }
        for generator in &descriptor.generators {
            experiment
                .generators
                .push(LoadGenerator::from_descriptor(generator, architecture)?);
        }
        for fault in &descriptor.faults {
            experiment.faults.push(FaultInjection::from_descriptor(fault, architecture)?);
        }
        for summon in &descriptor.summons {
            experiment.summons.push(InstanceSummon::from_descriptor(summon, architecture)?);
        }
        Ok(experiment)
    }

    pub fn with_duration(mut self, duration: SimTime) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_generator(mut self, generator: LoadGenerator) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn with_fault(mut self, fault: FaultInjection) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn with_summon(mut self, summon: InstanceSummon) -> Self {
        self.summons.push(summon);
        self
    }

    pub fn config(&self) -> SimulationConfig {
        self.config
    }

    /// Simulated time the run is bounded by, if any.
    pub fn duration(&self) -> Option<SimTime> {
        self.duration
    }

    /// Runs until the duration passes, or until the queue drains without one.
    pub fn executor(&self) -> Executor {
        self.duration.map_or_else(Executor::unbound, Executor::timed)
    }

    pub fn generators(&self) -> &[LoadGenerator] {
        &self.generators
    }

    pub fn faults(&self) -> &[FaultInjection] {
        &self.faults
    }

    pub fn summons(&self) -> &[InstanceSummon] {
        &self.summons
    }

    /// Hands the generators to `mesh` and schedules the experiment's initial
    /// events. Fault injections run at [`Priority::VeryHigh`], so an instance
    /// killed at `t` takes no new work at `t`.
    pub fn install(self, sim: &mut Simulation, mesh: Key<MeshEvent>) -> Result<(), SimError> {
        for generator in self.generators {
            let start = generator.start();
            let index = sim
                .get_component_mut::<MeshEvent, ServiceMesh>(mesh)
                .ok_or_else(|| ConfigurationError::Other("service mesh is not registered".into()))?
                .add_generator(generator);
            sim.schedule_at(start, Priority::Normal, mesh, MeshEvent::Generate { generator: index })?;
        }
        for fault in self.faults {
            sim.schedule_at(
                fault.time(),
                Priority::VeryHigh,
                mesh,
                MeshEvent::KillInstances {
                    service: fault.service(),
                    count: fault.instances(),
                },
            )?;
        }
        for summon in self.summons {
            sim.schedule_at(
                summon.time(),
                Priority::Normal,
                mesh,
                MeshEvent::SummonInstances {
                    service: summon.service(),
                    count: summon.instances(),
                },
            )?;
        }
        Ok(())
    }
}

/// Creates a simulation running `experiment` against `architecture`.
///
/// `listeners` are attached to every request, in order. Returns the
/// simulation together with the key of its [`ServiceMesh`].
pub fn build_simulation(
    architecture: Architecture,
    experiment: Experiment,
    listeners: impl IntoIterator<Item = SharedListener>,
) -> Result<(Simulation, Key<MeshEvent>), SimError> {
    let config = experiment.config();
    let mut mesh = ServiceMesh::new(architecture, &config)?;
    for listener in listeners {
        mesh.add_listener(listener);
    }
    info!(
        seed = config.seed,
        generators = experiment.generators().len(),
        faults = experiment.faults().len(),
        summons = experiment.summons().len(),
        "Experiment installed"
    );
    let mut sim = Simulation::new(config);
    let key = sim.add_component(mesh);
    experiment.install(&mut sim, key)?;
    Ok((sim, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchitectureDescriptor, OperationDescriptor, ServiceDescriptor};
    use crate::listener::RequestTracker;
    use crate::RequestFailedReason;
    use faultline_core::{DistributionConfig, Sampler};

    fn architecture() -> Architecture {
        let descriptor = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("api")
            .instances(1)
            .capacity(1000)
            .operation(OperationDescriptor::new("get", DistributionConfig::Constant { value: 100.0 }))]);
        Architecture::from_descriptor(&descriptor).unwrap()
    }

    #[test]
    fn generator_respects_limit() {
        let architecture = architecture();
        let operation = architecture.operation_id("api", "get").unwrap();
        let generator = LoadGenerator::new(operation, Sampler::constant(1.0).unwrap(), SimTime::zero())
            .unwrap()
            .limit(3);
        let tracker = RequestTracker::shared();
        let (mut sim, _) = build_simulation(
            architecture,
            Experiment::new(SimulationConfig { seed: 5 }).with_generator(generator),
            [tracker.clone() as SharedListener],
        )
        .unwrap();
        sim.execute(Executor::unbound()).unwrap();

        let tracker = tracker.borrow();
        assert_eq!(tracker.sent(), 3);
        assert_eq!(tracker.completed(), 3);
        assert_eq!(tracker.total_failed(), 0);
    }

    #[test]
    fn timeout_beats_completion() {
        let architecture = architecture();
        let operation = architecture.operation_id("api", "get").unwrap();
        // 100 units at 1000 units/s take exactly the timeout.
        let generator = LoadGenerator::new(operation, Sampler::constant(1.0).unwrap(), SimTime::zero())
            .unwrap()
            .limit(1)
            .timeout(SimTime::from_millis(100));
        let tracker = RequestTracker::shared();
        let (mut sim, _) = build_simulation(
            architecture,
            Experiment::new(SimulationConfig::default()).with_generator(generator),
            [tracker.clone() as SharedListener],
        )
        .unwrap();
        sim.execute(Executor::unbound()).unwrap();

        let tracker = tracker.borrow();
        assert_eq!(tracker.completed(), 0);
        assert_eq!(tracker.failed(RequestFailedReason::Timeout), 1);
    }

    #[test]
    fn faults_are_scheduled_at_their_time() {
        let architecture = architecture();
        let service = architecture.service_id("api").unwrap();
        let experiment = Experiment::new(SimulationConfig::default())
            .with_fault(FaultInjection::new(service, 1, SimTime::from_secs(3)).unwrap());
        let (mut sim, key) = build_simulation(architecture, experiment, Vec::<SharedListener>::new()).unwrap();
        assert_eq!(sim.peek_next_event_time(), Some(SimTime::from_secs(3)));
        sim.execute(Executor::unbound()).unwrap();
        let mesh: &mut ServiceMesh = sim.get_component_mut(key).unwrap();
        assert_eq!(mesh.running_instances(service), 0);
    }

    #[test]
    fn duration_bounds_the_run() {
        let architecture = architecture();
        let operation = architecture.operation_id("api", "get").unwrap();
        let generator = LoadGenerator::new(operation, Sampler::constant(1.0).unwrap(), SimTime::zero()).unwrap();
        let experiment = Experiment::new(SimulationConfig::default())
            .with_duration(SimTime::from_millis(4500))
            .with_generator(generator);
        let executor = experiment.executor();
        let (mut sim, key) = build_simulation(architecture, experiment, Vec::<SharedListener>::new()).unwrap();
        sim.execute(executor).unwrap();
        assert!(sim.time() <= SimTime::from_millis(4500));
        let mesh: &mut ServiceMesh = sim.get_component_mut(key).unwrap();
        assert_eq!(mesh.generators()[0].emitted(), 5);
    }

    #[test]
    fn duration_must_be_non_negative() {
        let descriptor = ExperimentDescriptor {
            duration: Some(-2.0),
            ..ExperimentDescriptor::default()
        };
        assert!(Experiment::from_descriptor(&descriptor, &architecture()).is_err());
    }
}
