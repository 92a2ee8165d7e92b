//! Unified error hierarchy for adaptrs
//!
//! The numerical core degrades gracefully wherever it can (skipped
//! observations, population fallbacks, synthetic priors), so errors are
//! reserved for malformed input caught at the boundary and for the few
//! numerical failures that cannot be recovered locally.

use thiserror::Error;

/// Top-level error type for all adaptrs operations
#[derive(Debug, Error)]
pub enum AdaptError {
    /// Request validation errors, raised before any core logic runs
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),
}

/// Numerical calculation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    /// Insufficient data for calculation
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// A NaN or infinity appeared where a finite value is required
    #[error("Non-finite value in {calculation}")]
    NonFinite { calculation: String },

    /// ODE integration could not complete
    #[error("Integration failed: {reason}")]
    Integration { reason: String },

    /// Covariance matrix could not be factorized
    #[error("Matrix factorization failed: {reason}")]
    Factorization { reason: String },
}

/// Result type alias for adaptrs operations
pub type Result<T> = std::result::Result<T, AdaptError>;

impl AdaptError {
    /// Shorthand for a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        AdaptError::Validation(message.into())
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdaptError::Validation(_) => ErrorSeverity::Warning,
            AdaptError::Calculation(CalculationError::InsufficientData { .. }) => {
                ErrorSeverity::Warning
            }
            AdaptError::Calculation(_) => ErrorSeverity::Error,
            AdaptError::Configuration(_) => ErrorSeverity::Error,
            AdaptError::Io(_) | AdaptError::Serialization(_) | AdaptError::Export(_) => {
                ErrorSeverity::Error
            }
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AdaptError::Validation(reason) => format!("The request is invalid: {}", reason),
            AdaptError::Calculation(CalculationError::InsufficientData { calculation, .. }) => {
                format!(
                    "Not enough data to compute {}. Keep logging feedback and try again.",
                    calculation
                )
            }
            AdaptError::Calculation(CalculationError::Integration { .. }) => {
                "The fitness-fatigue forecast did not converge. Try a shorter horizon or a larger step."
                    .to_string()
            }
            AdaptError::Serialization(err) => format!("Could not read the request JSON: {}", err),
            AdaptError::Configuration(reason) => {
                format!("The configuration file needs fixing: {}", reason)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the operation
    Error,
    /// Rejected input the caller can correct
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
