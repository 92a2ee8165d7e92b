//! Fatigue-curve regression
//!
//! Learns fatigue fraction (0 = recovered, 1 = maximal) as a function of
//! time since a session and its context, with ±2σ predictive bands. Until
//! enough real observations exist the model is trained on a synthetic
//! dataset drawn from the closed-form exponential decay, so predictions
//! follow the parametric baseline on cold start.

pub mod gp;

use crate::error::{AdaptError, Result};
use crate::precision::{round_series, round_to};
use crate::recovery::{NutritionStatus, RECOVERY_TIME_CONSTANT};
use crate::validation::{require_all_finite, require_finite, require_range, Validate};
use gp::{GaussianProcess, GpConfig, KernelParams, Regressor, StandardScaler};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default prediction hours of a fatigue forecast
pub const DEFAULT_PREDICTION_HOURS: [f64; 11] = [
    0.0, 6.0, 12.0, 18.0, 24.0, 36.0, 48.0, 60.0, 72.0, 96.0, 120.0,
];

/// Hours sampled by the synthetic prior dataset
const PRIOR_HOURS: [f64; 12] = [
    0.0, 3.0, 6.0, 12.0, 18.0, 24.0, 36.0, 48.0, 60.0, 72.0, 96.0, 120.0,
];

/// Sleep variants of the synthetic prior and their fatigue modifiers
const PRIOR_SLEEP_VARIANTS: [(f64, f64); 3] = [(6.0, 1.0), (7.5, 1.0), (9.0, 0.75)];

fn default_sleep_hours() -> f64 {
    7.5
}

fn default_stress_level() -> f64 {
    3.0
}

fn default_age() -> f64 {
    25.0
}

fn default_session_stress() -> f64 {
    50.0
}

fn default_prediction_hours() -> Vec<f64> {
    DEFAULT_PREDICTION_HOURS.to_vec()
}

/// One fatigue observation used for training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueDataPoint {
    pub hours_since_session: f64,
    pub session_stress: f64,
    #[serde(default = "default_sleep_hours")]
    pub sleep_hours: f64,
    #[serde(default)]
    pub nutrition_status: NutritionStatus,
    #[serde(default = "default_stress_level")]
    pub stress_level: f64,
    #[serde(default = "default_age")]
    pub age: f64,
    #[serde(default)]
    pub is_compound_dominant: bool,

    /// Measured fatigue fraction in [0, 1]
    pub observed_fatigue_fraction: f64,
}

impl FatigueDataPoint {
    /// Feature vector: hours, stress, sleep, nutrition, stress level, age, compound flag
    pub fn features(&self) -> Vec<f64> {
        FatigueContext {
            sleep_hours: self.sleep_hours,
            nutrition_status: self.nutrition_status,
            stress_level: self.stress_level,
            age: self.age,
            is_compound_dominant: self.is_compound_dominant,
        }
        .features(self.hours_since_session, self.session_stress)
    }
}

/// Context of the session being forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueContext {
    pub sleep_hours: f64,
    pub nutrition_status: NutritionStatus,
    pub stress_level: f64,
    pub age: f64,
    pub is_compound_dominant: bool,
}

impl Default for FatigueContext {
    fn default() -> Self {
        FatigueContext {
            sleep_hours: 7.5,
            nutrition_status: NutritionStatus::Maintenance,
            stress_level: 3.0,
            age: 25.0,
            is_compound_dominant: false,
        }
    }
}

impl FatigueContext {
    fn features(&self, hours: f64, session_stress: f64) -> Vec<f64> {
        vec![
            hours,
            session_stress,
            self.sleep_hours,
            self.nutrition_status.as_feature(),
            self.stress_level,
            self.age,
            if self.is_compound_dominant { 1.0 } else { 0.0 },
        ]
    }
}

/// Regressor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Observations needed before the model trains on real data
    pub min_observations: usize,

    /// Gaussian process used for real observations
    pub observed_gp: GpConfig,

    /// Gaussian process used for the synthetic prior
    pub prior_gp: GpConfig,

    /// Width of the uncertainty band in standard deviations
    pub band_sigmas: f64,

    /// Fatigue below which the athlete counts as recovered
    pub recovered_threshold: f64,

    /// Post-peak mean below which supercompensation is reported
    pub supercompensation_threshold: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        let observed_gp = GpConfig::default();
        let prior_gp = GpConfig {
            initial: KernelParams {
                noise: 0.1,
                ..observed_gp.initial
            },
            diagonal_jitter: 1e-4,
            restarts: 3,
            ..observed_gp.clone()
        };
        FatigueConfig {
            min_observations: 3,
            observed_gp,
            prior_gp,
            band_sigmas: 2.0,
            recovered_threshold: 0.05,
            supercompensation_threshold: -0.02,
        }
    }
}

/// What a fitted model was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Observed,
    SyntheticPrior,
}

/// Fitted fatigue model: feature scaler plus regressor
#[derive(Debug, Clone)]
pub struct FatigueModel {
    source: ModelSource,
    scaler: StandardScaler,
    regressor: GaussianProcess,
}

impl FatigueModel {
    pub fn source(&self) -> ModelSource {
        self.source
    }

    pub fn regressor(&self) -> &GaussianProcess {
        &self.regressor
    }
}

/// Forecast fatigue curve with uncertainty band and derived events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueCurve {
    pub hours: Vec<f64>,
    pub mean_fatigue: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub peak_fatigue_hour: f64,
    pub supercompensation_hour: Option<f64>,
    pub full_recovery_hour: f64,
    pub model_source: ModelSource,
}

impl FatigueCurve {
    pub fn rounded(&self) -> Self {
        FatigueCurve {
            hours: round_series(&self.hours, 1),
            mean_fatigue: round_series(&self.mean_fatigue, 3),
            upper_bound: round_series(&self.upper_bound, 3),
            lower_bound: round_series(&self.lower_bound, 3),
            peak_fatigue_hour: round_to(self.peak_fatigue_hour, 1),
            supercompensation_hour: self.supercompensation_hour.map(|h| round_to(h, 1)),
            full_recovery_hour: round_to(self.full_recovery_hour, 1),
            model_source: self.model_source,
        }
    }
}

/// Request payload for a fatigue forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatiguePredictionRequest {
    #[serde(default)]
    pub training_data: Vec<FatigueDataPoint>,
    #[serde(default = "default_prediction_hours")]
    pub prediction_hours: Vec<f64>,
    #[serde(default = "default_session_stress")]
    pub session_stress: f64,
    #[serde(default)]
    pub context: Option<FatigueContext>,
}

impl Default for FatiguePredictionRequest {
    fn default() -> Self {
        FatiguePredictionRequest {
            training_data: Vec::new(),
            prediction_hours: default_prediction_hours(),
            session_stress: default_session_stress(),
            context: None,
        }
    }
}

impl Validate for FatiguePredictionRequest {
    fn validate(&self) -> Result<()> {
        if self.prediction_hours.is_empty() {
            return Err(AdaptError::validation("prediction_hours must not be empty"));
        }
        require_all_finite("prediction_hours", &self.prediction_hours)?;
        require_finite("session_stress", self.session_stress)?;
        if let Some(ctx) = &self.context {
            require_all_finite("context", &ctx.features(0.0, 0.0))?;
        }
        for (i, point) in self.training_data.iter().enumerate() {
            require_all_finite(&format!("training_data[{}]", i), &point.features())?;
            require_range(
                &format!("training_data[{}].observed_fatigue_fraction", i),
                point.observed_fatigue_fraction,
                0.0,
                1.0,
            )?;
        }
        Ok(())
    }
}

/// Synthetic training data following the exponential recovery model
///
/// Fatigue ramps linearly to its peak at hour 6, then decays so that about
/// 95% has cleared 48 h later. Scaled to 0.8 and replicated for three sleep
/// durations, long sleep clearing fatigue faster.
pub fn synthetic_prior_dataset() -> Vec<FatigueDataPoint> {
    let k = RECOVERY_TIME_CONSTANT / 48.0;
    PRIOR_HOURS
        .iter()
        .flat_map(|&hours| {
            let shape = if hours >= 6.0 {
                (-k * (hours - 6.0)).exp()
            } else {
                (hours / 6.0).min(1.0)
            };
            let base = shape * 0.8;

            PRIOR_SLEEP_VARIANTS
                .iter()
                .map(move |&(sleep_hours, modifier)| FatigueDataPoint {
                    hours_since_session: hours,
                    session_stress: 50.0,
                    sleep_hours,
                    nutrition_status: NutritionStatus::Maintenance,
                    stress_level: 3.0,
                    age: 25.0,
                    is_compound_dominant: true,
                    observed_fatigue_fraction: (base * modifier).min(1.0),
                })
        })
        .collect()
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| {
            if *v > bv {
                (i, *v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// Gaussian-process fatigue-curve regressor
#[derive(Debug, Clone, Default)]
pub struct FatigueCurveRegressor {
    config: FatigueConfig,
}

impl FatigueCurveRegressor {
    pub fn new() -> Self {
        FatigueCurveRegressor {
            config: FatigueConfig::default(),
        }
    }

    pub fn with_config(config: FatigueConfig) -> Self {
        FatigueCurveRegressor { config }
    }

    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    fn train(
        &self,
        data: &[FatigueDataPoint],
        gp_config: &GpConfig,
        source: ModelSource,
    ) -> Result<FatigueModel> {
        let features: Vec<Vec<f64>> = data.iter().map(FatigueDataPoint::features).collect();
        let targets: Vec<f64> = data.iter().map(|p| p.observed_fatigue_fraction).collect();

        // The synthetic prior lives on raw features so hour and sleep keep their own scale
        let scaler = match source {
            ModelSource::Observed => StandardScaler::fit(&features),
            ModelSource::SyntheticPrior => {
                StandardScaler::identity(features.first().map_or(0, Vec::len))
            }
        };
        let regressor = GaussianProcess::fit(gp_config, &scaler.transform_all(&features), &targets)?;

        Ok(FatigueModel {
            source,
            scaler,
            regressor,
        })
    }

    /// Model trained on the synthetic exponential-decay dataset
    pub fn prior_model(&self) -> Result<FatigueModel> {
        self.train(
            &synthetic_prior_dataset(),
            &self.config.prior_gp,
            ModelSource::SyntheticPrior,
        )
    }

    /// Train on observations, or on the synthetic prior when too few exist
    pub fn fit(&self, data: &[FatigueDataPoint]) -> Result<FatigueModel> {
        if data.len() < self.config.min_observations {
            debug!(
                observations = data.len(),
                required = self.config.min_observations,
                "Too few fatigue observations, using synthetic prior"
            );
            return self.prior_model();
        }

        match self.train(data, &self.config.observed_gp, ModelSource::Observed) {
            Ok(model) => Ok(model),
            Err(err) => {
                warn!(error = %err, "Fatigue model fit failed, falling back to synthetic prior");
                self.prior_model()
            }
        }
    }

    /// Forecast fatigue at each requested hour after a session
    pub fn predict(
        &self,
        model: &FatigueModel,
        hours: &[f64],
        session_stress: f64,
        context: &FatigueContext,
    ) -> Result<FatigueCurve> {
        if hours.is_empty() {
            return Err(AdaptError::validation("prediction hours must not be empty"));
        }

        let queries: Vec<Vec<f64>> = hours
            .iter()
            .map(|&h| model.scaler.transform(&context.features(h, session_stress)))
            .collect();
        let prediction = model.regressor.predict(&queries)?;

        let band = self.config.band_sigmas;
        let mean_fatigue: Vec<f64> = prediction.mean.iter().map(|m| m.clamp(0.0, 1.0)).collect();
        let upper_bound = prediction
            .mean
            .iter()
            .zip(&prediction.std_dev)
            .map(|(m, s)| (m + band * s.max(0.0)).clamp(0.0, 1.0))
            .collect();
        let lower_bound = prediction
            .mean
            .iter()
            .zip(&prediction.std_dev)
            .map(|(m, s)| (m - band * s.max(0.0)).clamp(0.0, 1.0))
            .collect();

        let peak = argmax(&mean_fatigue);
        // Scanned on the clamped mean, so a dip below zero cannot be observed
        let supercompensation_hour = mean_fatigue
            .iter()
            .enumerate()
            .skip(peak + 1)
            .find(|(_, m)| **m < self.config.supercompensation_threshold)
            .map(|(i, _)| hours[i]);
        let full_recovery_hour = mean_fatigue
            .iter()
            .enumerate()
            .skip(peak + 1)
            .find(|(_, m)| **m < self.config.recovered_threshold)
            .map_or(hours[hours.len() - 1], |(i, _)| hours[i]);

        debug!(
            source = ?model.source,
            points = hours.len(),
            peak_hour = hours[peak],
            full_recovery_hour,
            "Fatigue curve predicted"
        );

        Ok(FatigueCurve {
            hours: hours.to_vec(),
            mean_fatigue,
            upper_bound,
            lower_bound,
            peak_fatigue_hour: hours[peak],
            supercompensation_hour,
            full_recovery_hour,
            model_source: model.source,
        })
    }

    /// Handle a validated forecast request end to end
    pub fn run(&self, request: &FatiguePredictionRequest) -> Result<FatigueCurve> {
        request.validate()?;
        let model = self.fit(&request.training_data)?;
        let context = request.context.clone().unwrap_or_default();
        self.predict(
            &model,
            &request.prediction_hours,
            request.session_stress,
            &context,
        )
    }
}
