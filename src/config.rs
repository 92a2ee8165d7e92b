use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::banister::{FitnessFatigueSolver, SolverConfig};
use crate::error::AdaptError;
use crate::fatigue::{FatigueConfig, FatigueCurveRegressor};
use crate::logging::LogConfig;
use crate::optimize::NelderMeadConfig;
use crate::recovery::{RecoveryConfig, RecoveryEstimator};
use crate::self_improvement::{EvaluatorConfig, SelfImprovementEvaluator};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Logging output
    pub logging: LogConfig,

    /// Bayesian recovery estimator
    pub recovery: RecoveryConfig,

    /// Gaussian-process fatigue regressor
    pub fatigue: FatigueConfig,

    /// Fitness-fatigue ODE solver and integrator
    pub solver: SolverConfig,

    /// Simplex optimizer used for parameter fitting
    pub optimizer: NelderMeadConfig,

    /// Self-improvement thresholds
    pub evaluator: EvaluatorConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        let now = Utc::now();
        ConfigMetadata {
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            metadata: ConfigMetadata::default(),
            logging: LogConfig::default(),
            recovery: RecoveryConfig::default(),
            fatigue: FatigueConfig::default(),
            solver: SolverConfig::default(),
            optimizer: NelderMeadConfig::default(),
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the models cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        fn invalid(field: &str, value: impl std::fmt::Display) -> AdaptError {
            AdaptError::Configuration(format!("{} has an unusable value: {}", field, value))
        }

        let recovery = &self.recovery;
        if !(recovery.credible_mass > 0.0 && recovery.credible_mass < 1.0) {
            return Err(invalid("recovery.credible_mass", recovery.credible_mass));
        }
        if !(recovery.min_implied_hours > 0.0
            && recovery.min_implied_hours < recovery.max_implied_hours)
        {
            return Err(invalid("recovery.min_implied_hours", recovery.min_implied_hours));
        }

        let positive = [
            ("solver.pulse_width_hours", self.solver.pulse_width_hours),
            ("solver.step_hours", self.solver.step_hours),
            ("solver.multi_system_step_hours", self.solver.multi_system_step_hours),
            ("fatigue.band_sigmas", self.fatigue.band_sigmas),
            ("evaluator.max_acceptable_error", self.evaluator.max_acceptable_error),
        ];
        if let Some((field, value)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(invalid(field, value));
        }
        if self.solver.max_samples == 0 {
            return Err(invalid("solver.max_samples", 0));
        }
        Ok(())
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// `~/.adaptrs/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".adaptrs")
            .join("config.toml")
    }

    /// Load from the default path, falling back to built-in defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %err,
                    "Ignoring unreadable configuration, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    pub fn recovery_estimator(&self) -> RecoveryEstimator {
        RecoveryEstimator::with_config(self.recovery.clone())
    }

    pub fn fatigue_regressor(&self) -> FatigueCurveRegressor {
        FatigueCurveRegressor::with_config(self.fatigue.clone())
    }

    pub fn solver(&self) -> FitnessFatigueSolver {
        FitnessFatigueSolver::with_config(self.solver.clone()).with_optimizer(self.optimizer.clone())
    }

    pub fn evaluator(&self) -> SelfImprovementEvaluator {
        SelfImprovementEvaluator::with_config(self.evaluator.clone())
    }
}
