//! Fault injection and scale-out
//!
//! A [`FaultInjection`] kills running instances of a service at a fixed
//! time; an [`InstanceSummon`] starts new ones. Counts are validated at
//! construction, so negative values never reach a run.

use crate::architecture::{Architecture, ServiceId};
use crate::builder::{count, seconds};
use crate::config::{FaultInjectionDescriptor, InstanceSummonDescriptor};
use faultline_core::{ConfigurationError, SimTime};

/// Kills up to `instances` running instances of `service` at `time`.
///
/// When fewer instances are running, all of them are killed. Work in flight
/// on a killed instance fails with `INSTANCE_KILLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultInjection {
    service: ServiceId,
    instances: usize,
    time: SimTime,
}

impl FaultInjection {
    /// # Errors
    ///
    /// [`ConfigurationError::Negative`] for a negative instance count.
    pub fn new(service: ServiceId, instances: i64, time: SimTime) -> Result<Self, ConfigurationError> {
        Ok(Self {
            service,
            instances: count("instances to kill", instances)?,
            time,
        })
    }

    pub fn from_descriptor(
        descriptor: &FaultInjectionDescriptor,
        architecture: &Architecture,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            architecture.require_service(&descriptor.service)?,
            descriptor.instances,
            seconds("fault time", descriptor.time)?,
        )
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn time(&self) -> SimTime {
        self.time
    }
}

/// Starts `instances` new instances of `service` at `time`. They serve once
/// the service's startup delay has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceSummon {
    service: ServiceId,
    instances: usize,
    time: SimTime,
}

impl InstanceSummon {
    pub fn new(service: ServiceId, instances: i64, time: SimTime) -> Result<Self, ConfigurationError> {
        Ok(Self {
            service,
            instances: count("instances to summon", instances)?,
            time,
        })
    }

    pub fn from_descriptor(
        descriptor: &InstanceSummonDescriptor,
        architecture: &Architecture,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            architecture.require_service(&descriptor.service)?,
            descriptor.instances,
            seconds("summon time", descriptor.time)?,
        )
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn time(&self) -> SimTime {
        self.time
    }
}
