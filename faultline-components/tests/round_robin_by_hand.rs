//! Round-robin CPU scheduling checked against a schedule worked out by hand.
//!
//! One instance with capacity 1 unit/s and quantum 2 receives three requests
//! at t=0 with demands A=5, B=3, C=8:
//!
//! ```text
//! t:  0  2  4  6  8  9  11 12 14 16
//!     A  B  C  A  B  C  A  C  C
//! ```
//!
//! B finishes at 9, A at 12, C at 16; the CPU never idles.

use faultline_components::config::{ArchitectureDescriptor, OperationDescriptor, ServiceDescriptor};
use faultline_components::{
    build_simulation, Architecture, Experiment, MeshEvent, NotificationKind, OperationId, RequestId,
    RequestTracker, SchedulerPolicy, ServiceMesh, SharedListener,
};
use faultline_core::{DistributionConfig, Executor, SimTime, SimulationConfig};

fn constant(value: f64) -> DistributionConfig {
    DistributionConfig::Constant { value }
}

fn architecture(scheduler: SchedulerPolicy) -> Architecture {
    let descriptor = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("worker")
        .capacity(1)
        .scheduler(scheduler)
        .operation(OperationDescriptor::new("a", constant(5.0)))
        .operation(OperationDescriptor::new("b", constant(3.0)))
        .operation(OperationDescriptor::new("c", constant(8.0)))]);
    Architecture::from_descriptor(&descriptor).unwrap()
}

/// Sends one call to each operation at t=0 and returns (request, arrival time)
/// in completion order.
fn completions(scheduler: SchedulerPolicy) -> (Vec<(RequestId, SimTime)>, SimTime) {
    let architecture = architecture(scheduler);
    let operations: Vec<OperationId> = ["a", "b", "c"]
        .iter()
        .map(|name| architecture.operation_id("worker", name).unwrap())
        .collect();
    let tracker = RequestTracker::shared();
    let (mut sim, mesh) = build_simulation(
        architecture,
        Experiment::new(SimulationConfig::default()),
        [tracker.clone() as SharedListener],
    )
    .unwrap();
    for operation in operations {
        sim.schedule(SimTime::zero(), mesh, MeshEvent::Call { operation, caller: None });
    }
    sim.execute(Executor::unbound()).unwrap();

    let done = tracker
        .borrow()
        .notifications()
        .iter()
        .filter(|n| n.kind == NotificationKind::ResultArrived)
        .map(|n| (n.request, n.time))
        .collect();
    let mesh: ServiceMesh = sim.remove_component(mesh).unwrap();
    assert_eq!(mesh.live_requests(), 0);
    (done, sim.time())
}

#[test]
fn classical_round_robin_order() {
    let (done, end) = completions(SchedulerPolicy::RoundRobin { quantum: 2 });
    assert_eq!(
        done,
        vec![
            (RequestId(2), SimTime::from_secs(9)),
            (RequestId(1), SimTime::from_secs(12)),
            (RequestId(3), SimTime::from_secs(16)),
        ]
    );
    assert_eq!(end, SimTime::from_secs(16));
}

#[test]
fn fifo_runs_to_completion_in_arrival_order() {
    let (done, end) = completions(SchedulerPolicy::Fifo);
    assert_eq!(
        done,
        vec![
            (RequestId(1), SimTime::from_secs(5)),
            (RequestId(2), SimTime::from_secs(8)),
            (RequestId(3), SimTime::from_secs(16)),
        ]
    );
    assert_eq!(end, SimTime::from_secs(16));
}

#[test]
fn huge_quantum_degenerates_to_fifo() {
    let (done, _) = completions(SchedulerPolicy::RoundRobin { quantum: 100 });
    let order: Vec<RequestId> = done.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![RequestId(1), RequestId(2), RequestId(3)]);
}

#[test]
fn total_elapsed_time_is_total_demand_for_every_policy() {
    for policy in [
        SchedulerPolicy::Fifo,
        SchedulerPolicy::RoundRobin { quantum: 1 },
        SchedulerPolicy::RoundRobin { quantum: 3 },
        SchedulerPolicy::Mlfq {
            levels: 3,
            base_quantum: 1,
        },
    ] {
        let (done, end) = completions(policy);
        assert_eq!(done.len(), 3, "{policy:?}");
        assert_eq!(end, SimTime::from_secs(16), "{policy:?}");
    }
}
