//! Microservice architectures on top of `faultline-core`
//!
//! This crate models a set of microservices, their operations and the
//! probabilistic dependencies between them, and simulates requests flowing
//! through that graph:
//!
//! - [`architecture`]: validated services, operations and dependency edges.
//! - [`cpu`]: CPU processes and the FIFO, round-robin and MLFQ schedulers
//!   that share an instance's capacity between them.
//! - [`instance`]: replicas of a service, each with its own scheduler.
//! - [`load_balancer`]: picks the instance that receives a request.
//! - [`mesh`]: the [`ServiceMesh`] component that drives every request from
//!   creation to a terminal state.
//! - [`listener`]: lifecycle notifications and the [`RequestTracker`] sink.
//! - [`fault`], [`generator`], [`experiment`]: the load and faults applied
//!   during a run.
//! - [`config`]: serde descriptors an external parser produces.
//!
//! # Example
//!
//! ```rust
//! use faultline_components::config::{ArchitectureDescriptor, ExperimentDescriptor, GeneratorDescriptor,
//!     OperationDescriptor, ServiceDescriptor};
//! use faultline_components::{build_simulation, Architecture, Experiment, RequestTracker, SharedListener};
//! use faultline_core::DistributionConfig;
//!
//! let architecture = Architecture::from_descriptor(&ArchitectureDescriptor::new(vec![
//!     ServiceDescriptor::new("frontend")
//!         .instances(2)
//!         .operation(OperationDescriptor::new("index", DistributionConfig::Constant { value: 50.0 })),
//! ]))
//! .unwrap();
//! let experiment = Experiment::from_descriptor(
//!     &ExperimentDescriptor {
//!         seed: 7,
//!         duration: Some(10.0),
//!         generators: vec![GeneratorDescriptor {
//!             service: "frontend".into(),
//!             operation: "index".into(),
//!             interval: DistributionConfig::Exponential { mean: 0.5 },
//!             start: 0.0,
//!             stop: None,
//!             limit: None,
//!             timeout: None,
//!         }],
//!         ..ExperimentDescriptor::default()
//!     },
//!     &architecture,
//! )
//! .unwrap();
//!
//! let tracker = RequestTracker::shared();
//! let executor = experiment.executor();
//! let (mut sim, _mesh) = build_simulation(architecture, experiment, [tracker.clone() as SharedListener]).unwrap();
//! sim.execute(executor).unwrap();
//! assert!(tracker.borrow().completed() > 0);
//! ```

pub mod architecture;
pub mod builder;
pub mod config;
pub mod cpu;
pub mod dependency;
pub mod error;
pub mod experiment;
pub mod fault;
pub mod generator;
pub mod instance;
pub mod listener;
pub mod load_balancer;
pub mod mesh;
pub mod request;

pub use architecture::{Architecture, DependencyRef, Microservice, Operation, OperationId, ServiceId};
pub use cpu::{CpuProcess, CpuProcessScheduler, ProcessId, SchedulerPolicy};
pub use dependency::{resolve_dependencies, Dependency};
pub use error::RequestFailedReason;
pub use experiment::{build_simulation, Experiment};
pub use fault::{FaultInjection, InstanceSummon};
pub use generator::LoadGenerator;
pub use instance::{InstanceId, InstanceState, MicroserviceInstance};
pub use listener::{
    ListenerHandle, Notification, NotificationKind, RequestTracker, RequestUpdateListener, SharedListener,
};
pub use load_balancer::{Candidate, LoadBalancer, LoadBalancingStrategy};
pub use mesh::{MeshEvent, ServiceMesh};
pub use request::{Request, RequestId, RequestState};
