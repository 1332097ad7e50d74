//! # Faultline - microservice resilience simulation
//!
//! Faultline is a deterministic, replayable, discrete-event simulator of
//! microservice architectures. Requests compete for CPU on service instances,
//! fan out along probabilistic dependencies and fail when instances are
//! killed, all on a logical clock driven by a single seeded generator.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! faultline = "0.1"
//! ```
//!
//! ## Crates
//!
//! - [`core`]: event queue, logical time, distributions, run control.
//! - [`components`]: architecture model, CPU schedulers, load balancing,
//!   request lifecycle and fault injection.

pub use faultline_core as core;

pub use faultline_components as components;

pub mod prelude {
    //! Commonly used types and traits

    pub use faultline_core::{
        Component, DistributionConfig, Execute, Executor, Key, Priority, Sampler, SimError, SimRng, SimTime,
        Simulation, SimulationConfig,
    };

    pub use faultline_components::config::{
        ArchitectureDescriptor, DependencyDescriptor, ExperimentDescriptor, OperationDescriptor, ServiceDescriptor,
    };
    pub use faultline_components::{
        build_simulation, Architecture, Experiment, FaultInjection, LoadBalancingStrategy, LoadGenerator,
        MeshEvent, RequestFailedReason, RequestTracker, SchedulerPolicy, ServiceMesh, SharedListener,
    };
}
