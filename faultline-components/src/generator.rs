//! External load
//!
//! A [`LoadGenerator`] emits requests to one operation at sampled intervals,
//! starting at `start`, until `stop` passes or `limit` requests have been
//! emitted. Each emitted request may carry a timeout after which it fails
//! with `TIMEOUT` unless its result has arrived.

use crate::architecture::{Architecture, OperationId};
use crate::builder::seconds;
use crate::config::GeneratorDescriptor;
use faultline_core::{ConfigurationError, InvariantViolation, Sampler, SimRng, SimTime};

#[derive(Debug, Clone)]
pub struct LoadGenerator {
    operation: OperationId,
    interval: Sampler,
    start: SimTime,
    stop: Option<SimTime>,
    limit: Option<u64>,
    timeout: Option<SimTime>,
    emitted: u64,
}

impl LoadGenerator {
    /// # Errors
    ///
    /// An interval that is always zero (a zero constant, `uniform(0, 0)`,
    /// `normal(0, 0)`) is rejected: the generator would never let the clock
    /// advance.
    pub fn new(operation: OperationId, interval: Sampler, start: SimTime) -> Result<Self, ConfigurationError> {
        if let Some(value) = interval.fixed_value() {
            if value <= 0.0 {
                return Err(ConfigurationError::NonPositive {
                    field: "generator interval",
                    value,
                });
            }
        }
        Ok(Self {
            operation,
            interval,
            start,
            stop: None,
            limit: None,
            timeout: None,
            emitted: 0,
        })
    }

    pub fn from_descriptor(
        descriptor: &GeneratorDescriptor,
        architecture: &Architecture,
    ) -> Result<Self, ConfigurationError> {
        let operation = architecture.require_operation(&descriptor.service, &descriptor.operation)?;
        let mut generator = Self::new(
            operation,
            Sampler::new(descriptor.interval.clone())?,
            seconds("generator start", descriptor.start)?,
        )?;
        if let Some(stop) = descriptor.stop {
            generator = generator.stop_at(seconds("generator stop", stop)?);
        }
        if let Some(limit) = descriptor.limit {
            generator = generator.limit(limit);
        }
        if let Some(timeout) = descriptor.timeout {
            generator = generator.timeout(seconds("generator timeout", timeout)?);
        }
        Ok(generator)
    }

    pub fn stop_at(mut self, stop: SimTime) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: SimTime) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn start(&self) -> SimTime {
        self.start
    }

    pub fn request_timeout(&self) -> Option<SimTime> {
        self.timeout
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }

    /// Whether a request may be emitted at `now`.
    pub fn should_emit(&self, now: SimTime) -> bool {
        !self.exhausted() && now >= self.start && self.stop.map_or(true, |stop| now <= stop)
    }

    pub fn record_emission(&mut self) {
        self.emitted += 1;
    }

    /// Delay until the next emission, or `None` once the generator is done.
    pub fn next_delay(&self, now: SimTime, rng: &mut SimRng) -> Result<Option<SimTime>, InvariantViolation> {
        if self.exhausted() {
            return Ok(None);
        }
        let delay = self.interval.sample_delay(rng)?;
        Ok(match self.stop {
            Some(stop) if now + delay > stop => None,
            _ => Some(delay),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::DistributionConfig;

    fn every(secs: f64) -> Sampler {
        Sampler::constant(secs).unwrap()
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(LoadGenerator::new(OperationId(0), every(0.0), SimTime::zero()).is_err());
    }

    #[test]
    fn degenerate_zero_intervals_are_rejected() {
        for config in [
            DistributionConfig::Uniform { min: 0.0, max: 0.0 },
            DistributionConfig::Normal { mean: 0.0, std_dev: 0.0 },
            DistributionConfig::Normal { mean: -1.0, std_dev: 0.0 },
        ] {
            let interval = Sampler::new(config.clone()).unwrap();
            assert!(
                matches!(
                    LoadGenerator::new(OperationId(0), interval, SimTime::zero()),
                    Err(ConfigurationError::NonPositive { .. })
                ),
                "{config} accepted"
            );
        }
        let spread = Sampler::new(DistributionConfig::Uniform { min: 0.0, max: 1.0 }).unwrap();
        assert!(LoadGenerator::new(OperationId(0), spread, SimTime::zero()).is_ok());
    }

    #[test]
    fn stops_at_limit() {
        let mut rng = SimRng::new(1);
        let mut generator = LoadGenerator::new(OperationId(0), every(1.0), SimTime::zero())
            .unwrap()
            .limit(2);
        assert!(generator.should_emit(SimTime::zero()));
        generator.record_emission();
        assert_eq!(
            generator.next_delay(SimTime::zero(), &mut rng).unwrap(),
            Some(SimTime::from_secs(1))
        );
        generator.record_emission();
        assert!(!generator.should_emit(SimTime::from_secs(1)));
        assert_eq!(generator.next_delay(SimTime::from_secs(1), &mut rng).unwrap(), None);
    }

    #[test]
    fn stops_after_stop_time() {
        let mut rng = SimRng::new(1);
        let generator = LoadGenerator::new(OperationId(0), every(1.0), SimTime::zero())
            .unwrap()
            .stop_at(SimTime::from_millis(2500));
        assert!(generator.next_delay(SimTime::from_secs(1), &mut rng).unwrap().is_some());
        assert_eq!(generator.next_delay(SimTime::from_secs(2), &mut rng).unwrap(), None);
        assert!(generator.should_emit(SimTime::from_millis(2500)));
        assert!(!generator.should_emit(SimTime::from_secs(3)));
    }
}
