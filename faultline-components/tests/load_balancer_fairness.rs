//! Least-utilization balancing: strict minimum, fair ties, seeded replay.

use faultline_components::config::{ArchitectureDescriptor, OperationDescriptor, ServiceDescriptor};
use faultline_components::{
    build_simulation, Architecture, Candidate, Experiment, InstanceId, LoadBalancer, LoadBalancingStrategy,
    MeshEvent, RequestFailedReason, RequestId, RequestTracker, SchedulerPolicy, ServiceMesh, SharedListener,
};
use faultline_core::{DistributionConfig, Executor, SimRng, SimTime, SimulationConfig};

fn candidates(demands: &[f64]) -> Vec<Candidate> {
    demands
        .iter()
        .enumerate()
        .map(|(i, demand)| Candidate {
            instance: InstanceId(i as u64 + 1),
            relative_work_demand: *demand,
        })
        .collect()
}

#[test]
fn ties_are_broken_uniformly() {
    const TRIALS: usize = 30_000;
    let mut rng = SimRng::new(2024);
    let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastUtilization);
    let set = candidates(&[0.5, 0.5, 0.9, 0.5]);

    let mut picks = [0usize; 5];
    for _ in 0..TRIALS {
        let chosen = balancer.next_instance(&set, &mut rng).unwrap();
        picks[chosen.0 as usize] += 1;
    }
    assert_eq!(picks[3], 0, "non-minimal instance was chosen");
    for instance in [1, 2, 4] {
        let share = picks[instance] as f64 / TRIALS as f64;
        assert!((share - 1.0 / 3.0).abs() < 0.02, "instance {instance} got share {share}");
    }
}

#[test]
fn tie_breaks_replay_with_the_same_seed() {
    let set = candidates(&[0.0, 0.0, 0.0, 0.0]);
    let sequence = |seed: u64| -> Vec<InstanceId> {
        let mut rng = SimRng::new(seed);
        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastUtilization);
        (0..200).map(|_| balancer.next_instance(&set, &mut rng).unwrap()).collect()
    };
    assert_eq!(sequence(9), sequence(9));
    assert_ne!(sequence(9), sequence(10));
}

#[test]
fn distinct_demands_pick_the_strict_minimum() {
    let mut rng = SimRng::new(1);
    let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastUtilization);
    let set = candidates(&[3.0, 1.25, 1.5, 7.0, 1.2500001]);
    for _ in 0..100 {
        assert_eq!(balancer.next_instance(&set, &mut rng), Ok(InstanceId(2)));
    }
}

#[test]
fn empty_set_fails_with_no_instance_available() {
    let mut rng = SimRng::new(1);
    let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastUtilization);
    assert_eq!(
        balancer.next_instance(&[], &mut rng),
        Err(RequestFailedReason::NoInstanceAvailable)
    );
}

/// Two idle instances tie; the first request breaks the tie at random and the
/// second must go to the other, now strictly less loaded, instance.
#[test]
fn mesh_spreads_simultaneous_requests() {
    let descriptor = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("api")
        .instances(2)
        .capacity(10)
        .load_balancer(LoadBalancingStrategy::LeastUtilization)
        .operation(OperationDescriptor::new("get", DistributionConfig::Constant { value: 10.0 }))])
    .network_latency(DistributionConfig::Constant { value: 0.001 });
    let architecture = Architecture::from_descriptor(&descriptor).unwrap();
    let operation = architecture.operation_id("api", "get").unwrap();
    let tracker = RequestTracker::shared();
    let (mut sim, mesh) = build_simulation(
        architecture,
        Experiment::new(SimulationConfig { seed: 3 }),
        [tracker.clone() as SharedListener],
    )
    .unwrap();
    sim.schedule(SimTime::zero(), mesh, MeshEvent::Call { operation, caller: None });
    sim.schedule(SimTime::from_millis(500), mesh, MeshEvent::Call { operation, caller: None });
    sim.execute(Executor::unbound()).unwrap();

    // Queued behind the first request, the second would take 1.502s.
    let tracker = tracker.borrow();
    assert_eq!(tracker.completed(), 2);
    assert_eq!(
        tracker.response_times(),
        &[SimTime::from_millis(1002), SimTime::from_millis(1002)]
    );
}

/// With two threads per instance a busy thread holds its whole process. The
/// long request must keep counting in full while its first burst runs, so
/// every short request lands on the other instance.
#[test]
fn busy_threads_count_their_whole_process() {
    let descriptor = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("api")
        .instances(2)
        .capacity(10)
        .threads(2)
        .scheduler(SchedulerPolicy::RoundRobin { quantum: 5 })
        .load_balancer(LoadBalancingStrategy::LeastUtilization)
        .operation(OperationDescriptor::new("long", DistributionConfig::Constant { value: 100.0 }))
        .operation(OperationDescriptor::new("short", DistributionConfig::Constant { value: 5.0 }))]);
    let architecture = Architecture::from_descriptor(&descriptor).unwrap();
    let long = architecture.operation_id("api", "long").unwrap();
    let short = architecture.operation_id("api", "short").unwrap();
    let tracker = RequestTracker::shared();
    let (mut sim, key) = build_simulation(
        architecture,
        Experiment::new(SimulationConfig { seed: 5 }),
        [tracker.clone() as SharedListener],
    )
    .unwrap();
    sim.schedule(SimTime::zero(), key, MeshEvent::Call { operation: long, caller: None });
    for millis in [10, 20, 30] {
        sim.schedule(SimTime::from_millis(millis), key, MeshEvent::Call { operation: short, caller: None });
    }
    // Every burst takes at least 0.5s, so nothing has finished yet.
    sim.execute(Executor::timed(SimTime::from_millis(100))).unwrap();

    let mesh: &mut ServiceMesh = sim.get_component_mut(key).unwrap();
    let placed = |id: u64| mesh.request(RequestId(id)).and_then(|r| r.instance()).unwrap();
    let busy = placed(1);
    for id in 2..=4 {
        assert_ne!(placed(id), busy, "short request {id} joined the long one");
    }
    let other = placed(2);
    let busy_load = mesh.instance(busy).unwrap().relative_work_demand();
    let other_load = mesh.instance(other).unwrap().relative_work_demand();
    assert_eq!(busy_load, 100.0 / 20.0);
    assert_eq!(other_load, 15.0 / 20.0);

    sim.execute(Executor::unbound()).unwrap();
    assert_eq!(tracker.borrow().completed(), 4);
}
