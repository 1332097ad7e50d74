//! Probabilistic dependency edges between operations
//!
//! While an operation is being served, each of its dependencies independently
//! fires a child request with its configured probability. A dependency may
//! replace the default network latency with a custom delay and may add an
//! extra delay on top; both are drawn with negative values rejected.
//!
//! The resolver only decides which children fire. Retries, circuit breakers
//! and the like wrap its output elsewhere.

use crate::architecture::{DependencyRef, Operation, OperationId};
use crate::builder::{validate_non_negative, validate_probability};
use crate::config::DelayDescriptor;
use faultline_core::{ConfigurationError, DistributionConfig, InvariantViolation, Sampler, SimRng, SimTime};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Dependency {
    target: OperationId,
    probability: f64,
    custom_delay: Option<Sampler>,
    extra_delay: Option<Sampler>,
}

impl Dependency {
    /// # Errors
    ///
    /// [`ConfigurationError::ProbabilityOutOfRange`] unless `probability` lies in [0, 1].
    pub fn new(target: OperationId, probability: f64) -> Result<Self, ConfigurationError> {
        validate_probability(probability)?;
        Ok(Self {
            target,
            probability,
            custom_delay: None,
            extra_delay: None,
        })
    }

    /// Replaces the default network latency for calls along this edge.
    pub fn with_custom_delay(mut self, delay: Sampler) -> Self {
        self.custom_delay = Some(delay);
        self
    }

    /// Adds a delay on top of the transit latency for calls along this edge.
    pub fn with_extra_delay(mut self, delay: Sampler) -> Self {
        self.extra_delay = Some(delay);
        self
    }

    pub fn target(&self) -> OperationId {
        self.target
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn custom_delay(&self) -> Option<&Sampler> {
        self.custom_delay.as_ref()
    }

    pub fn extra_delay(&self) -> Option<&Sampler> {
        self.extra_delay.as_ref()
    }

    /// One Bernoulli trial. Consumes one value even for probability 0 or 1,
    /// so the random stream does not depend on the configured probabilities.
    pub fn fires(&self, rng: &mut SimRng) -> bool {
        rng.chance(self.probability)
    }

    /// Transit delay of a call along this edge: the custom delay if present,
    /// otherwise `network_latency`, plus the extra delay if present.
    pub fn transit_delay(&self, network_latency: &Sampler, rng: &mut SimRng) -> Result<SimTime, InvariantViolation> {
        let base = self.custom_delay.as_ref().unwrap_or(network_latency).sample_delay(rng)?;
        let extra = match &self.extra_delay {
            Some(extra) => extra.sample_delay(rng)?,
            None => SimTime::zero(),
        };
        Ok(base + extra)
    }
}

/// Builds a delay sampler from its configured form. A plain number becomes a
/// normal distribution centered on it with zero deviation.
pub fn delay_sampler(field: &'static str, delay: &DelayDescriptor) -> Result<Sampler, ConfigurationError> {
    match delay {
        DelayDescriptor::Fixed(mean) => {
            validate_non_negative(field, *mean)?;
            Sampler::new(DistributionConfig::Normal {
                mean: *mean,
                std_dev: 0.0,
            })
        }
        DelayDescriptor::Distribution(config) => Sampler::new(config.clone()),
    }
}

/// Decides, in declaration order, which dependencies of `operation` fire for
/// one invocation.
pub fn resolve_dependencies(operation: &Operation, rng: &mut SimRng) -> Vec<DependencyRef> {
    let fired: Vec<DependencyRef> = operation
        .dependencies()
        .iter()
        .enumerate()
        .filter(|(_, dependency)| dependency.fires(rng))
        .map(|(index, _)| DependencyRef {
            operation: operation.id(),
            index,
        })
        .collect();
    trace!(
        operation = %operation.name(),
        declared = operation.dependencies().len(),
        fired = fired.len(),
        "Resolved dependencies"
    );
    fired
}
