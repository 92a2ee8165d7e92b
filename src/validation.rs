//! Boundary validation for request payloads
//!
//! Requests are checked once, before any core logic executes. Anything the
//! core can degrade around (unusable observations, unmatched identifiers)
//! is left for the core to skip; only structurally malformed input is
//! rejected here.

use crate::error::{AdaptError, Result};

/// Implemented by every request type accepted at the crate boundary
pub trait Validate {
    /// Check the request, returning a descriptive validation error
    fn validate(&self) -> Result<()>;
}

/// Require a finite value
pub fn require_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AdaptError::validation(format!(
            "{} must be a finite number, got {}",
            field, value
        )))
    }
}

/// Require a finite, strictly positive value
pub fn require_positive(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(AdaptError::validation(format!(
            "{} must be positive, got {}",
            field, value
        )))
    }
}

/// Require a finite value inside an inclusive range
pub fn require_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    require_finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AdaptError::validation(format!(
            "{} must be within [{}, {}], got {}",
            field, min, max, value
        )))
    }
}

/// Require a non-empty identifier
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AdaptError::validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

/// Require every value in a series to be finite
pub fn require_all_finite(field: &str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(AdaptError::validation(format!(
            "{}[{}] must be a finite number, got {}",
            field, index, values[index]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert!(require_positive("horizon", 168.0).is_ok());
        assert!(require_positive("horizon", 0.0).is_err());
        assert!(require_positive("horizon", f64::INFINITY).is_err());
    }

    #[test]
    fn test_require_range() {
        assert!(require_range("fatigue", 0.5, 0.0, 1.0).is_ok());
        let err = require_range("fatigue", 1.5, 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("fatigue"));
    }

    #[test]
    fn test_require_all_finite() {
        assert!(require_all_finite("hours", &[0.0, 6.0]).is_ok());
        let err = require_all_finite("hours", &[0.0, f64::NAN]).unwrap_err();
        assert!(err.to_string().contains("hours[1]"));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("muscle", "quadriceps").is_ok());
        assert!(require_non_empty("muscle", "  ").is_err());
    }
}
