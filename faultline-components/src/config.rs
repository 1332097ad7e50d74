//! Serializable descriptors for architectures and experiments
//!
//! These are plain data, typically produced by deserializing JSON. They carry
//! no guarantees; [`Architecture::from_descriptor`] and
//! [`Experiment::from_descriptor`] validate them into typed model objects.
//!
//! [`Architecture::from_descriptor`]: crate::Architecture::from_descriptor
//! [`Experiment::from_descriptor`]: crate::Experiment::from_descriptor
//!
//! # Example
//!
//! ```rust
//! use faultline_components::config::ArchitectureDescriptor;
//!
//! let json = r#"{
//!     "services": [{
//!         "name": "gateway",
//!         "instances": 2,
//!         "operations": [{
//!             "name": "index",
//!             "demand": {"type": "constant", "value": 50},
//!             "dependencies": [{"service": "gateway", "operation": "health", "probability": 0.5}]
//!         }, {
//!             "name": "health",
//!             "demand": {"type": "constant", "value": 1}
//!         }]
//!     }]
//! }"#;
//! let descriptor: ArchitectureDescriptor = serde_json::from_str(json).unwrap();
//! assert_eq!(descriptor.services[0].operations.len(), 2);
//! ```

use crate::cpu::SchedulerPolicy;
use crate::load_balancer::LoadBalancingStrategy;
use faultline_core::DistributionConfig;
use serde::{Deserialize, Serialize};

fn default_network_latency() -> DistributionConfig {
    DistributionConfig::Constant { value: 0.0 }
}

fn default_instances() -> i64 {
    1
}

fn default_capacity() -> u64 {
    1000
}

fn default_threads() -> usize {
    1
}

fn default_probability() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    /// Transit delay of every call not overridden by a dependency, in seconds.
    #[serde(default = "default_network_latency")]
    pub network_latency: DistributionConfig,
    pub services: Vec<ServiceDescriptor>,
}

impl ArchitectureDescriptor {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            network_latency: default_network_latency(),
            services,
        }
    }

    pub fn network_latency(mut self, latency: DistributionConfig) -> Self {
        self.network_latency = latency;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Instances running at time zero.
    #[serde(default = "default_instances")]
    pub instances: i64,
    /// Work units one thread completes per simulated second.
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub scheduler: SchedulerPolicy,
    #[serde(default)]
    pub load_balancer: LoadBalancingStrategy,
    /// Seconds a summoned instance spends starting before it can serve.
    #[serde(default)]
    pub startup_delay: f64,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: default_instances(),
            capacity: default_capacity(),
            threads: default_threads(),
            scheduler: SchedulerPolicy::default(),
            load_balancer: LoadBalancingStrategy::default(),
            startup_delay: 0.0,
            operations: Vec::new(),
        }
    }

    pub fn instances(mut self, instances: i64) -> Self {
        self.instances = instances;
        self
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn scheduler(mut self, scheduler: SchedulerPolicy) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn load_balancer(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.load_balancer = strategy;
        self
    }

    pub fn startup_delay(mut self, seconds: f64) -> Self {
        self.startup_delay = seconds;
        self
    }

    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    /// CPU demand in work units.
    pub demand: DistributionConfig,
    #[serde(default)]
    pub dependencies: Vec<DependencyDescriptor>,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, demand: DistributionConfig) -> Self {
        Self {
            name: name.into(),
            demand,
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on(mut self, dependency: DependencyDescriptor) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub service: String,
    pub operation: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default)]
    pub custom_delay: Option<DelayDescriptor>,
    #[serde(default)]
    pub extra_delay: Option<DelayDescriptor>,
}

impl DependencyDescriptor {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            probability: default_probability(),
            custom_delay: None,
            extra_delay: None,
        }
    }

    pub fn probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn custom_delay(mut self, delay: DelayDescriptor) -> Self {
        self.custom_delay = Some(delay);
        self
    }

    pub fn extra_delay(mut self, delay: DelayDescriptor) -> Self {
        self.extra_delay = Some(delay);
        self
    }
}

/// A delay in seconds: either a fixed number or a full distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelayDescriptor {
    Fixed(f64),
    Distribution(DistributionConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    #[serde(default)]
    pub seed: u64,
    /// Simulated seconds to run for; unbounded when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub generators: Vec<GeneratorDescriptor>,
    #[serde(default)]
    pub faults: Vec<FaultInjectionDescriptor>,
    #[serde(default)]
    pub summons: Vec<InstanceSummonDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorDescriptor {
    pub service: String,
    pub operation: String,
    /// Seconds between two emitted requests.
    pub interval: DistributionConfig,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub stop: Option<f64>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Seconds after which an unanswered request fails with `TIMEOUT`.
    #[serde(default)]
    pub timeout: Option<f64>,
}

/// Kills running instances of a service at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInjectionDescriptor {
    pub service: String,
    pub instances: i64,
    pub time: f64,
}

/// Starts additional instances of a service at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummonDescriptor {
    pub service: String,
    pub instances: i64,
    pub time: f64,
}
