//! Self-improvement loop
//!
//! Scores logged predictions against the outcomes later observed for them,
//! per prediction system, and turns systematic bias into calibration
//! corrections the caller feeds into the next prediction cycle.

use crate::error::Result;
use crate::precision::{round_series, round_to};
use crate::validation::{require_finite, require_non_empty, Validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A logged prediction awaiting its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub prediction_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub muscle: Option<String>,
    /// Prediction system tag, e.g. muscular, cns, spinal, readiness
    pub system: String,
    pub predicted_value: f64,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

/// Observed ground truth for a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub prediction_id: String,
    pub actual_value: f64,
    #[serde(default)]
    pub feedback_source: String,
}

/// Error statistics for one prediction system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub system: String,
    pub mae: f64,
    pub rmse: f64,
    /// Mean of predicted - actual; positive means overestimation
    pub bias: f64,
    pub r_squared: f64,
    pub sample_size: usize,
}

impl ModelAccuracy {
    /// Statistics over (predicted, actual) pairs
    pub fn from_pairs(system: &str, pairs: &[(f64, f64)]) -> Self {
        let n = pairs.len().max(1) as f64;
        let errors: Vec<f64> = pairs.iter().map(|(p, a)| p - a).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
        let bias = errors.iter().sum::<f64>() / n;

        let actual_mean = pairs.iter().map(|(_, a)| a).sum::<f64>() / n;
        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let ss_tot: f64 = pairs.iter().map(|(_, a)| (a - actual_mean).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        ModelAccuracy {
            system: system.to_string(),
            mae,
            rmse,
            bias,
            r_squared,
            sample_size: pairs.len(),
        }
    }

    pub fn rounded(&self) -> Self {
        ModelAccuracy {
            system: self.system.clone(),
            mae: round_to(self.mae, 2),
            rmse: round_to(self.rmse, 2),
            bias: round_to(self.bias, 2),
            r_squared: round_to(self.r_squared, 3),
            sample_size: self.sample_size,
        }
    }
}

/// Accuracy report across all prediction systems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfImprovementReport {
    pub accuracy_by_system: Vec<ModelAccuracy>,
    /// Additive corrections keyed `{system}_bias_correction`
    pub suggested_adjustments: BTreeMap<String, f64>,
    /// 0-100, 100 meaning no error
    pub overall_prediction_score: f64,
    /// Chronological error sequence; decreasing means the model is learning
    pub improvement_trend: Vec<f64>,
    pub recommendations: Vec<String>,
}

impl SelfImprovementReport {
    pub fn rounded(&self) -> Self {
        SelfImprovementReport {
            accuracy_by_system: self
                .accuracy_by_system
                .iter()
                .map(ModelAccuracy::rounded)
                .collect(),
            suggested_adjustments: self
                .suggested_adjustments
                .iter()
                .map(|(k, v)| (k.clone(), round_to(*v, 2)))
                .collect(),
            overall_prediction_score: round_to(self.overall_prediction_score, 1),
            improvement_trend: round_series(&self.improvement_trend, 2),
            recommendations: self.recommendations.clone(),
        }
    }
}

/// Battery calibration offsets consumed by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalibrationDeltas {
    pub cns_delta: f64,
    pub muscular_delta: f64,
    pub spinal_delta: f64,
}

impl CalibrationDeltas {
    pub fn rounded(&self) -> Self {
        CalibrationDeltas {
            cns_delta: round_to(self.cns_delta, 1),
            muscular_delta: round_to(self.muscular_delta, 1),
            spinal_delta: round_to(self.spinal_delta, 1),
        }
    }

    fn channel_mut(&mut self, channel: CalibrationChannel) -> &mut f64 {
        match channel {
            CalibrationChannel::Cns => &mut self.cns_delta,
            CalibrationChannel::Muscular => &mut self.muscular_delta,
            CalibrationChannel::Spinal => &mut self.spinal_delta,
        }
    }
}

/// Calibration channel a prediction system feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationChannel {
    Cns,
    Muscular,
    Spinal,
}

impl CalibrationChannel {
    /// Match a system tag by substring, case-insensitively
    pub fn for_system(system: &str) -> Option<Self> {
        let system = system.to_lowercase();
        if system.contains("cns") || system.contains("neural") {
            Some(CalibrationChannel::Cns)
        } else if system.contains("muscul") {
            Some(CalibrationChannel::Muscular)
        } else if system.contains("spinal") || system.contains("connective") {
            Some(CalibrationChannel::Spinal)
        } else {
            None
        }
    }
}

/// Evaluator thresholds and factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// |bias| above which an adjustment is suggested
    pub bias_threshold: f64,

    /// Suggested adjustment = -factor × bias
    pub bias_correction_factor: f64,

    /// MAE above which more feedback is requested
    pub mae_alert_threshold: f64,

    /// Average absolute error that maps to a score of zero
    pub max_acceptable_error: f64,

    pub trend_window: usize,

    /// Calibration correction = -factor × bias
    pub correction_factor: f64,

    /// Share of the previous calibration carried into the new one
    pub carry_forward: f64,

    pub min_accuracy_samples: usize,
    pub min_correction_samples: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            bias_threshold: 5.0,
            bias_correction_factor: 0.3,
            mae_alert_threshold: 15.0,
            max_acceptable_error: 20.0,
            trend_window: 5,
            correction_factor: 0.25,
            carry_forward: 0.7,
            min_accuracy_samples: 2,
            min_correction_samples: 3,
        }
    }
}

/// Request payload for an accuracy evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfImprovementRequest {
    pub predictions: Vec<PredictionRecord>,
    pub outcomes: Vec<OutcomeRecord>,
}

/// Request payload for calibration corrections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub predictions: Vec<PredictionRecord>,
    pub outcomes: Vec<OutcomeRecord>,
    #[serde(default)]
    pub current_calibration: Option<CalibrationDeltas>,
}

/// Calibration corrections with the report they were derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResponse {
    pub corrections: CalibrationDeltas,
    pub accuracy_score: f64,
    pub details: SelfImprovementReport,
}

impl CorrectionResponse {
    pub fn rounded(&self) -> Self {
        CorrectionResponse {
            corrections: self.corrections.rounded(),
            accuracy_score: round_to(self.accuracy_score, 1),
            details: self.details.rounded(),
        }
    }
}

fn validate_records(predictions: &[PredictionRecord], outcomes: &[OutcomeRecord]) -> Result<()> {
    for (i, p) in predictions.iter().enumerate() {
        require_non_empty(&format!("predictions[{}].prediction_id", i), &p.prediction_id)?;
        require_non_empty(&format!("predictions[{}].system", i), &p.system)?;
        require_finite(&format!("predictions[{}].predicted_value", i), p.predicted_value)?;
    }
    for (i, o) in outcomes.iter().enumerate() {
        require_non_empty(&format!("outcomes[{}].prediction_id", i), &o.prediction_id)?;
        require_finite(&format!("outcomes[{}].actual_value", i), o.actual_value)?;
    }
    Ok(())
}

impl Validate for SelfImprovementRequest {
    fn validate(&self) -> Result<()> {
        validate_records(&self.predictions, &self.outcomes)
    }
}

impl Validate for CorrectionRequest {
    fn validate(&self) -> Result<()> {
        validate_records(&self.predictions, &self.outcomes)?;
        if let Some(cal) = &self.current_calibration {
            require_finite("current_calibration.cnsDelta", cal.cns_delta)?;
            require_finite("current_calibration.muscularDelta", cal.muscular_delta)?;
            require_finite("current_calibration.spinalDelta", cal.spinal_delta)?;
        }
        Ok(())
    }
}

/// Outcomes keyed by prediction id; a repeated id keeps the last outcome
fn outcome_index(outcomes: &[OutcomeRecord]) -> HashMap<&str, f64> {
    outcomes
        .iter()
        .map(|o| (o.prediction_id.as_str(), o.actual_value))
        .collect()
}

/// Prediction accuracy evaluator
#[derive(Debug, Clone, Default)]
pub struct SelfImprovementEvaluator {
    config: EvaluatorConfig,
}

impl SelfImprovementEvaluator {
    pub fn new() -> Self {
        SelfImprovementEvaluator {
            config: EvaluatorConfig::default(),
        }
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        SelfImprovementEvaluator { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Score predictions against outcomes
    pub fn evaluate(
        &self,
        predictions: &[PredictionRecord],
        outcomes: &[OutcomeRecord],
    ) -> SelfImprovementReport {
        let actuals = outcome_index(outcomes);

        // Systems in order of first appearance
        let mut systems: Vec<(&str, Vec<(f64, f64)>)> = Vec::new();
        for prediction in predictions {
            let Some(&actual) = actuals.get(prediction.prediction_id.as_str()) else {
                continue;
            };
            let pair = (prediction.predicted_value, actual);
            match systems.iter_mut().find(|(s, _)| *s == prediction.system) {
                Some((_, pairs)) => pairs.push(pair),
                None => systems.push((prediction.system.as_str(), vec![pair])),
            }
        }

        let mut accuracy_by_system = Vec::new();
        let mut abs_errors = Vec::new();
        let mut suggested_adjustments = BTreeMap::new();
        let mut recommendations = Vec::new();

        for (system, pairs) in &systems {
            if pairs.len() < self.config.min_accuracy_samples {
                continue;
            }
            let accuracy = ModelAccuracy::from_pairs(system, pairs);
            abs_errors.extend(pairs.iter().map(|(p, a)| (p - a).abs()));

            if accuracy.bias.abs() > self.config.bias_threshold {
                let adjustment = -accuracy.bias * self.config.bias_correction_factor;
                let direction = if accuracy.bias > 0.0 {
                    "overestimating"
                } else {
                    "underestimating"
                };
                suggested_adjustments.insert(format!("{}_bias_correction", system), adjustment);
                recommendations.push(format!(
                    "Predictions are {} {} by {:.0} points on average. Suggested adjustment: {:+.1} pts.",
                    direction,
                    system,
                    accuracy.bias.abs(),
                    adjustment
                ));
            }

            if accuracy.mae > self.config.mae_alert_threshold {
                recommendations.push(format!(
                    "Average error for {} is high ({:.0} pts). More feedback will improve accuracy.",
                    system, accuracy.mae
                ));
            }

            accuracy_by_system.push(accuracy);
        }

        let overall_prediction_score = if abs_errors.is_empty() {
            0.0
        } else {
            let average = abs_errors.iter().sum::<f64>() / abs_errors.len() as f64;
            ((1.0 - average / self.config.max_acceptable_error) * 100.0).clamp(0.0, 100.0)
        };

        if recommendations.is_empty() {
            recommendations.push(
                "Prediction accuracy is acceptable. Keep logging feedback to keep improving."
                    .to_string(),
            );
        }

        let improvement_trend = self.improvement_trend(predictions, outcomes);

        debug!(
            systems = accuracy_by_system.len(),
            paired = abs_errors.len(),
            score = overall_prediction_score,
            "Prediction accuracy evaluated"
        );

        SelfImprovementReport {
            accuracy_by_system,
            suggested_adjustments,
            overall_prediction_score,
            improvement_trend,
            recommendations,
        }
    }

    /// Chronological absolute errors, averaged over non-overlapping windows
    ///
    /// With fewer paired points than one window the raw errors are returned;
    /// a trailing partial window is dropped.
    pub fn improvement_trend(
        &self,
        predictions: &[PredictionRecord],
        outcomes: &[OutcomeRecord],
    ) -> Vec<f64> {
        let actuals = outcome_index(outcomes);
        let mut ordered: Vec<&PredictionRecord> = predictions.iter().collect();
        ordered.sort_by_key(|p| p.timestamp);

        let errors: Vec<f64> = ordered
            .iter()
            .filter_map(|p| {
                actuals
                    .get(p.prediction_id.as_str())
                    .map(|actual| (p.predicted_value - actual).abs())
            })
            .collect();

        let window = self.config.trend_window.max(1);
        if errors.len() < window {
            return errors;
        }
        errors
            .chunks_exact(window)
            .map(|chunk| chunk.iter().sum::<f64>() / window as f64)
            .collect()
    }

    /// Calibration corrections from a report, blended with the previous calibration
    pub fn derive_corrections(
        &self,
        report: &SelfImprovementReport,
        current: Option<&CalibrationDeltas>,
    ) -> CalibrationDeltas {
        let mut corrections = CalibrationDeltas::default();

        for accuracy in &report.accuracy_by_system {
            if accuracy.sample_size < self.config.min_correction_samples {
                continue;
            }
            if let Some(channel) = CalibrationChannel::for_system(&accuracy.system) {
                *corrections.channel_mut(channel) = -accuracy.bias * self.config.correction_factor;
            }
        }

        if let Some(previous) = current {
            corrections.cns_delta += previous.cns_delta * self.config.carry_forward;
            corrections.muscular_delta += previous.muscular_delta * self.config.carry_forward;
            corrections.spinal_delta += previous.spinal_delta * self.config.carry_forward;
        }

        corrections
    }

    /// Handle a validated evaluation request
    pub fn run(&self, request: &SelfImprovementRequest) -> Result<SelfImprovementReport> {
        request.validate()?;
        Ok(self.evaluate(&request.predictions, &request.outcomes))
    }

    /// Handle a validated correction request
    pub fn run_corrections(&self, request: &CorrectionRequest) -> Result<CorrectionResponse> {
        request.validate()?;
        let report = self.evaluate(&request.predictions, &request.outcomes);
        let corrections = self.derive_corrections(&report, request.current_calibration.as_ref());
        Ok(CorrectionResponse {
            corrections,
            accuracy_score: report.overall_prediction_score,
            details: report,
        })
    }
}
