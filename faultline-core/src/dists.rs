//! Distribution sampling for delays, CPU demands and arrival intervals
//!
//! A [`Sampler`] binds a validated [`DistributionConfig`] to a concrete
//! `rand_distr` distribution. It owns no generator: every draw borrows the
//! run's [`SimRng`], so all samplers of a run consume one ordered stream.
//!
//! Values are unitless (`f64`). Delays are interpreted as seconds of
//! simulated time, CPU demands as work units.

use crate::error::{ConfigurationError, InvariantViolation};
use crate::randomness::SimRng;
use crate::SimTime;
use rand_distr::{Exp, LogNormal, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on consecutive rejected draws in [`Sampler::sample_non_negative`].
pub const MAX_REJECTIONS: u32 = 10_000;

/// Serializable description of a probability distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionConfig {
    /// Always the same value.
    Constant { value: f64 },
    /// Gaussian. May produce negative draws.
    Normal { mean: f64, std_dev: f64 },
    /// Exponential with the given mean (rate = 1 / mean).
    Exponential { mean: f64 },
    /// Uniform on `[min, max)`. `min == max` degenerates to a constant.
    Uniform { min: f64, max: f64 },
    /// Log-normal, parameterised by the underlying normal.
    LogNormal { mu: f64, sigma: f64 },
}

impl fmt::Display for DistributionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => write!(f, "constant({value})"),
            Self::Normal { mean, std_dev } => write!(f, "normal({mean}, {std_dev})"),
            Self::Exponential { mean } => write!(f, "exponential(mean={mean})"),
            Self::Uniform { min, max } => write!(f, "uniform({min}, {max})"),
            Self::LogNormal { mu, sigma } => write!(f, "lognormal({mu}, {sigma})"),
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Constant(f64),
    Normal(Normal<f64>),
    Exponential(Exp<f64>),
    Uniform(Uniform<f64>),
    LogNormal(LogNormal<f64>),
}

/// A validated distribution ready to draw from.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: DistributionConfig,
    kind: Kind,
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidDistribution(format!("{field} must be finite, got {value}")))
    }
}

impl Sampler {
    pub fn new(config: DistributionConfig) -> Result<Self, ConfigurationError> {
        let kind = match config {
            DistributionConfig::Constant { value } => {
                require_finite("value", value)?;
                if value < 0.0 {
                    return Err(ConfigurationError::Negative { field: "constant value", value });
                }
                Kind::Constant(value)
            }
            DistributionConfig::Normal { mean, std_dev } => {
                require_finite("mean", mean)?;
                require_finite("std_dev", std_dev)?;
                let normal = Normal::new(mean, std_dev)
                    .map_err(|e| ConfigurationError::InvalidDistribution(format!("{config}: {e}")))?;
                Kind::Normal(normal)
            }
            DistributionConfig::Exponential { mean } => {
                require_finite("mean", mean)?;
                if mean <= 0.0 {
                    return Err(ConfigurationError::NonPositive { field: "exponential mean", value: mean });
                }
                let exp = Exp::new(1.0 / mean)
                    .map_err(|e| ConfigurationError::InvalidDistribution(format!("{config}: {e}")))?;
                Kind::Exponential(exp)
            }
            DistributionConfig::Uniform { min, max } => {
                require_finite("min", min)?;
                require_finite("max", max)?;
                if min > max {
                    return Err(ConfigurationError::InvalidDistribution(format!(
                        "uniform min {min} exceeds max {max}"
                    )));
                }
                if min == max {
                    Kind::Constant(min)
                } else {
                    Kind::Uniform(Uniform::new(min, max))
                }
            }
            DistributionConfig::LogNormal { mu, sigma } => {
                require_finite("mu", mu)?;
                require_finite("sigma", sigma)?;
                let log_normal = LogNormal::new(mu, sigma)
                    .map_err(|e| ConfigurationError::InvalidDistribution(format!("{config}: {e}")))?;
                Kind::LogNormal(log_normal)
            }
        };
        Ok(Self { config, kind })
    }

    /// Shorthand for a constant, non-negative value.
    pub fn constant(value: f64) -> Result<Self, ConfigurationError> {
        Self::new(DistributionConfig::Constant { value })
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// The only value this sampler can produce, if it has no spread: a
    /// constant, a uniform with `min == max`, or a normal with zero deviation.
    pub fn fixed_value(&self) -> Option<f64> {
        match (&self.kind, &self.config) {
            (Kind::Constant(value), _) => Some(*value),
            (Kind::Normal(_), DistributionConfig::Normal { mean, std_dev }) if *std_dev == 0.0 => Some(*mean),
            _ => None,
        }
    }

    /// Draws one raw value. Constants do not touch `rng`.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match &self.kind {
            Kind::Constant(value) => *value,
            Kind::Normal(d) => rng.sample(d),
            Kind::Exponential(d) => rng.sample(d),
            Kind::Uniform(d) => rng.sample(d),
            Kind::LogNormal(d) => rng.sample(d),
        }
    }

    /// Draws until a non-negative value appears.
    ///
    /// The negative tail is discarded, not clamped, so the positive part of
    /// the distribution keeps its shape.
    pub fn sample_non_negative(&self, rng: &mut SimRng) -> Result<f64, InvariantViolation> {
        for _ in 0..MAX_REJECTIONS {
            let value = self.sample(rng);
            if value >= 0.0 {
                return Ok(value);
            }
        }
        Err(InvariantViolation::SamplingExhausted {
            distribution: self.config.to_string(),
            attempts: MAX_REJECTIONS,
        })
    }

    /// Non-negative draw interpreted as seconds of simulated time.
    pub fn sample_delay(&self, rng: &mut SimRng) -> Result<SimTime, InvariantViolation> {
        let secs = self.sample_non_negative(rng)?;
        SimTime::try_from_secs_f64(secs).ok_or_else(|| {
            InvariantViolation::Inconsistent(format!("delay of {secs}s from {} is not representable", self.config))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_samplers_report_their_value() {
        let fixed = |config| Sampler::new(config).unwrap().fixed_value();
        assert_eq!(fixed(DistributionConfig::Constant { value: 2.0 }), Some(2.0));
        assert_eq!(fixed(DistributionConfig::Uniform { min: 0.0, max: 0.0 }), Some(0.0));
        assert_eq!(fixed(DistributionConfig::Normal { mean: 0.0, std_dev: 0.0 }), Some(0.0));
        assert_eq!(fixed(DistributionConfig::Normal { mean: 1.0, std_dev: 0.5 }), None);
        assert_eq!(fixed(DistributionConfig::Uniform { min: 0.0, max: 1.0 }), None);
    }

    #[test]
    fn constant_rejects_negative() {
        assert!(matches!(
            Sampler::constant(-1.0),
            Err(ConfigurationError::Negative { .. })
        ));
        let s = Sampler::constant(2.0).unwrap();
        let mut rng = SimRng::new(0);
        assert_eq!(s.sample(&mut rng), 2.0);
        assert_eq!(s.sample_delay(&mut rng).unwrap(), SimTime::from_secs(2));
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        assert!(Sampler::new(DistributionConfig::Normal { mean: 0.0, std_dev: -1.0 }).is_err());
        assert!(Sampler::new(DistributionConfig::Exponential { mean: 0.0 }).is_err());
        assert!(Sampler::new(DistributionConfig::Uniform { min: 2.0, max: 1.0 }).is_err());
        assert!(Sampler::new(DistributionConfig::Normal { mean: f64::NAN, std_dev: 1.0 }).is_err());
    }

    #[test]
    fn degenerate_uniform_is_constant() {
        let s = Sampler::new(DistributionConfig::Uniform { min: 3.0, max: 3.0 }).unwrap();
        let mut rng = SimRng::new(5);
        assert_eq!(s.sample(&mut rng), 3.0);
    }

    #[test]
    fn zero_deviation_normal_behaves_as_constant() {
        let s = Sampler::new(DistributionConfig::Normal { mean: 0.25, std_dev: 0.0 }).unwrap();
        let mut rng = SimRng::new(5);
        for _ in 0..10 {
            assert_eq!(s.sample_non_negative(&mut rng).unwrap(), 0.25);
        }
    }

    #[test]
    fn non_negative_over_many_draws() {
        let configs = [
            DistributionConfig::Normal { mean: 0.0, std_dev: 1.0 },
            DistributionConfig::Normal { mean: -3.0, std_dev: 2.0 },
            DistributionConfig::Normal { mean: 1.0, std_dev: 1e6 },
            DistributionConfig::Uniform { min: -5.0, max: 0.5 },
        ];
        let mut rng = SimRng::new(1234);
        for config in configs {
            let s = Sampler::new(config).unwrap();
            for _ in 0..5_000 {
                assert!(s.sample_non_negative(&mut rng).unwrap() >= 0.0);
            }
        }
    }

    #[test]
    fn rejection_keeps_positive_tail_shape() {
        // Truncated N(0,1) on [0, inf) has mean sqrt(2/pi) ~= 0.798. Clamping
        // would pull the mean down to ~0.399.
        let s = Sampler::new(DistributionConfig::Normal { mean: 0.0, std_dev: 1.0 }).unwrap();
        let mut rng = SimRng::new(99);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| s.sample_non_negative(&mut rng).unwrap()).sum::<f64>() / n as f64;
        assert!((mean - 0.798).abs() < 0.03, "mean was {mean}");
    }

    #[test]
    fn hopeless_distribution_exhausts() {
        let s = Sampler::new(DistributionConfig::Normal { mean: -1e9, std_dev: 1.0 }).unwrap();
        let mut rng = SimRng::new(1);
        assert!(matches!(
            s.sample_non_negative(&mut rng),
            Err(InvariantViolation::SamplingExhausted { attempts: MAX_REJECTIONS, .. })
        ));
    }

    #[test]
    fn deserializes_tagged_config() {
        let cfg: DistributionConfig =
            serde_json::from_str(r#"{"type":"normal","mean":1.5,"std_dev":0.5}"#).unwrap();
        assert_eq!(cfg, DistributionConfig::Normal { mean: 1.5, std_dev: 0.5 });
    }
}
