//! Validated architecture model: microservices, operations and their dependencies
//!
//! An [`Architecture`] is immutable once built. Services and operations are
//! addressed by dense indices ([`ServiceId`], [`OperationId`]) assigned in
//! declaration order, so lookups during a run never hash strings.

use crate::builder::{count, seconds, validate_non_empty, validate_positive};
use crate::config::{ArchitectureDescriptor, DependencyDescriptor, ServiceDescriptor};
use crate::cpu::SchedulerPolicy;
use crate::dependency::{delay_sampler, Dependency};
use crate::load_balancer::LoadBalancingStrategy;
use faultline_core::{ConfigurationError, Sampler, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub usize);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service({})", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.0)
    }
}

/// Addresses one dependency edge: the `index`-th dependency of `operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    pub operation: OperationId,
    pub index: usize,
}

/// A logical service and the configuration shared by all of its instances.
#[derive(Debug, Clone)]
pub struct Microservice {
    id: ServiceId,
    name: String,
    initial_instances: usize,
    capacity: u64,
    threads: usize,
    scheduler: SchedulerPolicy,
    load_balancing: LoadBalancingStrategy,
    startup_delay: SimTime,
    operations: Vec<OperationId>,
}

impl Microservice {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_instances(&self) -> usize {
        self.initial_instances
    }

    /// Work units per simulated second, per thread.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn scheduler(&self) -> SchedulerPolicy {
        self.scheduler
    }

    pub fn load_balancing(&self) -> LoadBalancingStrategy {
        self.load_balancing
    }

    pub fn startup_delay(&self) -> SimTime {
        self.startup_delay
    }

    pub fn operations(&self) -> &[OperationId] {
        &self.operations
    }
}

/// A named unit of work offered by a microservice.
#[derive(Debug, Clone)]
pub struct Operation {
    id: OperationId,
    name: String,
    service: ServiceId,
    demand: Sampler,
    dependencies: Vec<Dependency>,
}

impl Operation {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// CPU demand per invocation, in work units.
    pub fn demand(&self) -> &Sampler {
        &self.demand
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

#[derive(Debug, Clone)]
pub struct Architecture {
    services: Vec<Microservice>,
    operations: Vec<Operation>,
    network_latency: Sampler,
    service_names: HashMap<String, ServiceId>,
}

impl Architecture {
    /// Validates `descriptor` and resolves every name into an index.
    ///
    /// # Errors
    ///
    /// Any structural problem is reported as a [`ConfigurationError`]:
    /// duplicate or unknown names, probabilities outside [0, 1], negative
    /// counts or delays, zero capacity or threads, invalid distributions.
    pub fn from_descriptor(descriptor: &ArchitectureDescriptor) -> Result<Self, ConfigurationError> {
        let mut service_names = HashMap::new();
        let mut operation_names = HashMap::new();
        let mut services = Vec::with_capacity(descriptor.services.len());

        // Names first, so dependencies may point forward.
        for (index, service) in descriptor.services.iter().enumerate() {
            validate_non_empty("service name", &service.name)?;
            if service_names.insert(service.name.clone(), ServiceId(index)).is_some() {
                return Err(ConfigurationError::DuplicateName(service.name.clone()));
            }
            services.push(Self::service_from(ServiceId(index), service)?);
        }
        let mut next_operation = 0;
        for (service, declared) in services.iter_mut().zip(&descriptor.services) {
            for operation in &declared.operations {
                validate_non_empty("operation name", &operation.name)?;
                let id = OperationId(next_operation);
                next_operation += 1;
                let key = (declared.name.clone(), operation.name.clone());
                if operation_names.insert(key, id).is_some() {
                    return Err(ConfigurationError::DuplicateName(format!(
                        "{}.{}",
                        declared.name, operation.name
                    )));
                }
                service.operations.push(id);
            }
        }

        let mut operations = Vec::with_capacity(next_operation);
        for (service, declared) in services.iter().zip(&descriptor.services) {
            for (id, operation) in service.operations.iter().zip(&declared.operations) {
                let demand = Sampler::new(operation.demand.clone())?;
                let dependencies = operation
                    .dependencies
                    .iter()
                    .map(|dependency| Self::dependency_from(dependency, &operation_names))
                    .collect::<Result<Vec<_>, _>>()?;
                operations.push(Operation {
                    id: *id,
                    name: operation.name.clone(),
                    service: service.id,
                    demand,
                    dependencies,
                });
            }
        }

        let architecture = Self {
            services,
            operations,
            network_latency: Sampler::new(descriptor.network_latency.clone())?,
            service_names,
        };
        debug!(
            services = architecture.services.len(),
            operations = architecture.operations.len(),
            "Architecture validated"
        );
        Ok(architecture)
    }

    fn service_from(id: ServiceId, descriptor: &ServiceDescriptor) -> Result<Microservice, ConfigurationError> {
        validate_positive("capacity", descriptor.capacity as f64)?;
        validate_positive("threads", descriptor.threads as f64)?;
        descriptor.scheduler.validate()?;
        Ok(Microservice {
            id,
            name: descriptor.name.clone(),
            initial_instances: count("instances", descriptor.instances)?,
            capacity: descriptor.capacity,
            threads: descriptor.threads,
            scheduler: descriptor.scheduler,
            load_balancing: descriptor.load_balancer,
            startup_delay: seconds("startup delay", descriptor.startup_delay)?,
            operations: Vec::new(),
        })
    }

    fn dependency_from(
        descriptor: &DependencyDescriptor,
        operation_names: &HashMap<(String, String), OperationId>,
    ) -> Result<Dependency, ConfigurationError> {
        let target = operation_names
            .get(&(descriptor.service.clone(), descriptor.operation.clone()))
            .copied()
            .ok_or_else(|| {
                ConfigurationError::UnknownOperation(format!("{}.{}", descriptor.service, descriptor.operation))
            })?;
        let mut dependency = Dependency::new(target, descriptor.probability)?;
        if let Some(delay) = &descriptor.custom_delay {
            dependency = dependency.with_custom_delay(delay_sampler("custom delay", delay)?);
        }
        if let Some(delay) = &descriptor.extra_delay {
            dependency = dependency.with_extra_delay(delay_sampler("extra delay", delay)?);
        }
        Ok(dependency)
    }

    pub fn services(&self) -> &[Microservice] {
        &self.services
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn service(&self, id: ServiceId) -> Option<&Microservice> {
        self.services.get(id.0)
    }

    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.get(id.0)
    }

    pub fn dependency(&self, edge: DependencyRef) -> Option<&Dependency> {
        self.operation(edge.operation)?.dependencies.get(edge.index)
    }

    pub fn service_id(&self, name: &str) -> Option<ServiceId> {
        self.service_names.get(name).copied()
    }

    /// Looks up an operation by service and operation name.
    pub fn operation_id(&self, service: &str, operation: &str) -> Option<OperationId> {
        let service = self.service(self.service_id(service)?)?;
        service
            .operations
            .iter()
            .copied()
            .find(|id| self.operations[id.0].name == operation)
    }

    /// Like [`service_id`](Self::service_id) but reports a missing name.
    pub fn require_service(&self, name: &str) -> Result<ServiceId, ConfigurationError> {
        self.service_id(name)
            .ok_or_else(|| ConfigurationError::UnknownService(name.to_string()))
    }

    /// Like [`operation_id`](Self::operation_id) but reports a missing name.
    pub fn require_operation(&self, service: &str, operation: &str) -> Result<OperationId, ConfigurationError> {
        self.require_service(service)?;
        self.operation_id(service, operation)
            .ok_or_else(|| ConfigurationError::UnknownOperation(format!("{service}.{operation}")))
    }

    /// Default transit latency of a call, in seconds.
    pub fn network_latency(&self) -> &Sampler {
        &self.network_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelayDescriptor, OperationDescriptor};
    use faultline_core::DistributionConfig;

    fn constant(value: f64) -> DistributionConfig {
        DistributionConfig::Constant { value }
    }

    fn shop() -> ArchitectureDescriptor {
        ArchitectureDescriptor::new(vec![
            ServiceDescriptor::new("frontend").instances(2).operation(
                OperationDescriptor::new("checkout", constant(20.0))
                    .depends_on(DependencyDescriptor::new("payment", "charge").probability(0.9))
                    .depends_on(
                        DependencyDescriptor::new("frontend", "render").custom_delay(DelayDescriptor::Fixed(0.001)),
                    ),
            ),
            ServiceDescriptor::new("payment").operation(OperationDescriptor::new("charge", constant(5.0))),
        ])
    }

    #[test]
    fn resolves_forward_references() {
        let mut descriptor = shop();
        descriptor.services[0]
            .operations
            .push(OperationDescriptor::new("render", constant(1.0)));
        let architecture = Architecture::from_descriptor(&descriptor).unwrap();

        let checkout = architecture.require_operation("frontend", "checkout").unwrap();
        let charge = architecture.require_operation("payment", "charge").unwrap();
        let render = architecture.operation_id("frontend", "render").unwrap();
        let op = architecture.operation(checkout).unwrap();
        assert_eq!(op.dependencies()[0].target(), charge);
        assert_eq!(op.dependencies()[1].target(), render);
        assert!(op.dependencies()[1].custom_delay().is_some());
        assert_eq!(
            architecture.dependency(DependencyRef {
                operation: checkout,
                index: 0
            })
            .map(Dependency::probability),
            Some(0.9)
        );
        assert_eq!(architecture.service(op.service()).unwrap().initial_instances(), 2);
    }

    #[test]
    fn unknown_dependency_target() {
        assert_eq!(
            Architecture::from_descriptor(&shop()).unwrap_err(),
            ConfigurationError::UnknownOperation("frontend.render".into())
        );
    }

    #[test]
    fn invalid_probability_fails_construction() {
        let descriptor = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("a").operation(
            OperationDescriptor::new("x", constant(1.0)).depends_on(DependencyDescriptor::new("a", "x").probability(1.2)),
        )]);
        assert_eq!(
            Architecture::from_descriptor(&descriptor).unwrap_err(),
            ConfigurationError::ProbabilityOutOfRange(1.2)
        );
    }

    #[test]
    fn structural_errors() {
        let duplicate = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("a"), ServiceDescriptor::new("a")]);
        assert_eq!(
            Architecture::from_descriptor(&duplicate).unwrap_err(),
            ConfigurationError::DuplicateName("a".into())
        );

        let negative = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("a").instances(-1)]);
        assert!(matches!(
            Architecture::from_descriptor(&negative),
            Err(ConfigurationError::Negative { field: "instances", .. })
        ));

        let no_threads = ArchitectureDescriptor::new(vec![ServiceDescriptor::new("a").threads(0)]);
        assert!(matches!(
            Architecture::from_descriptor(&no_threads),
            Err(ConfigurationError::NonPositive { field: "threads", .. })
        ));

        let bad_demand = ArchitectureDescriptor::new(vec![
            ServiceDescriptor::new("a").operation(OperationDescriptor::new("x", constant(-3.0))),
        ]);
        assert!(Architecture::from_descriptor(&bad_demand).is_err());
    }
}
