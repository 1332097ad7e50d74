//! Validation helpers shared by the model constructors
//!
//! Every typed model object (dependencies, services, fault injections,
//! generators) checks its structural invariants once, at construction, using
//! these helpers. Nothing is re-validated while a run is executing.

use faultline_core::{ConfigurationError, SimTime};

/// Helper for validating probabilities
pub fn validate_probability(value: f64) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::ProbabilityOutOfRange(value))
    }
}

/// Helper for validating that a value is positive
pub fn validate_positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::NonPositive { field, value })
    }
}

/// Helper for validating that a value is non-negative
pub fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::Negative { field, value })
    }
}

/// Helper for validating that a name is not empty
pub fn validate_non_empty(field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        Err(ConfigurationError::Other(format!("{field} cannot be empty")))
    } else {
        Ok(())
    }
}

/// Converts a configured number of seconds into simulated time.
pub fn seconds(field: &'static str, value: f64) -> Result<SimTime, ConfigurationError> {
    validate_non_negative(field, value)?;
    SimTime::try_from_secs_f64(value)
        .ok_or_else(|| ConfigurationError::Other(format!("{field} of {value}s is not a representable time")))
}

/// Converts a signed count into a `usize`, rejecting negatives.
pub fn count(field: &'static str, value: i64) -> Result<usize, ConfigurationError> {
    if value < 0 {
        return Err(ConfigurationError::Negative {
            field,
            value: value as f64,
        });
    }
    usize::try_from(value).map_err(|_| ConfigurationError::Other(format!("{field} of {value} is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_probability() {
        assert!(validate_probability(0.0).is_ok());
        assert!(validate_probability(0.5).is_ok());
        assert!(validate_probability(1.0).is_ok());
        assert_eq!(
            validate_probability(1.01),
            Err(ConfigurationError::ProbabilityOutOfRange(1.01))
        );
        assert!(validate_probability(-0.1).is_err());
        assert!(validate_probability(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("test", 1.0).is_ok());
        assert!(validate_positive("test", 0.0).is_err());
        assert!(validate_positive("test", -1.0).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("test", 1.0).is_ok());
        assert!(validate_non_negative("test", 0.0).is_ok());
        assert!(validate_non_negative("test", -1.0).is_err());
        assert!(validate_non_negative("test", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("test", "hello").is_ok());
        assert!(validate_non_empty("test", " ").is_err());
    }

    #[test]
    fn test_seconds_and_count() {
        assert_eq!(seconds("time", 1.5), Ok(SimTime::from_millis(1500)));
        assert!(seconds("time", -1.0).is_err());
        assert_eq!(count("instances", 3), Ok(3));
        assert!(matches!(
            count("instances", -2),
            Err(ConfigurationError::Negative { field: "instances", .. })
        ));
    }
}
