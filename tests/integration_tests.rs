use adaptrs::banister::{BodySystem, MultiSystemRequest, SolveRequest};
use adaptrs::export::{render, ExportFormat};
use adaptrs::fatigue::{FatigueContext, FatigueCurveRegressor, FatiguePredictionRequest, ModelSource};
use adaptrs::recovery::{
    ConfidenceTier, RecoveryEstimateRequest, RecoveryEstimator, RecoveryObservation,
    RecoveryUpdateRequest, UserRecoveryPriors,
};
use adaptrs::self_improvement::{
    CalibrationDeltas, CorrectionRequest, OutcomeRecord, PredictionRecord,
    SelfImprovementEvaluator, SelfImprovementRequest,
};
use adaptrs::{AdaptError, AppConfig, BanisterParams, FitnessFatigueSolver, TrainingImpulse};
use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeMap;

/// Integration tests that exercise complete request/response workflows

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn prediction(id: usize, system: &str, predicted: f64) -> PredictionRecord {
        PredictionRecord {
            prediction_id: format!("pred-{}", id),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap() + Duration::hours(12 * id as i64),
            muscle: Some("cuádriceps".to_string()),
            system: system.to_string(),
            predicted_value: predicted,
            context: BTreeMap::new(),
        }
    }

    fn outcome(id: usize, actual: f64) -> OutcomeRecord {
        OutcomeRecord {
            prediction_id: format!("pred-{}", id),
            actual_value: actual,
            feedback_source: "morning_checkin".to_string(),
        }
    }

    #[test]
    fn test_scenario_a_first_recovery_observation() {
        let request: RecoveryUpdateRequest = serde_json::from_str(
            r#"{
                "observations": [{
                    "muscle": "cuádriceps",
                    "session_stress": 60,
                    "hours_since_session": 48,
                    "predicted_battery": 70,
                    "actual_battery": 50
                }],
                "current_priors": {}
            }"#,
        )
        .unwrap();

        let estimator = RecoveryEstimator::new();
        let update = estimator.run_update(&request).unwrap();

        let prior = update.updated_priors.get("cuádriceps").unwrap();
        assert_eq!(prior.alpha, 3.0);
        assert_eq!(update.updated_priors.total_observations, 1);
        assert_eq!(update.accepted_observations, 1);
        assert!(update.updated_priors.last_updated.is_some());

        // Implied recovery (~789 h) is clamped to 200 h: beta = 2*72 + 200
        assert!((prior.beta - 344.0).abs() < 1e-9);

        let hours = update.personalized_hours["cuádriceps"];
        assert!((hours - 72.0).abs() > 1.0);
        assert!(update.delta["cuádriceps"] > 0.0);

        let interval = update.confidence_intervals["cuádriceps"];
        assert!(interval.lower < hours && hours < interval.upper);

        // The caller's priors are untouched
        assert!(request.current_priors.muscle_priors.is_empty());
    }

    #[test]
    fn test_recovery_estimate_after_update() {
        let estimator = RecoveryEstimator::new();
        let observations: Vec<RecoveryObservation> = (0..12)
            .map(|i| RecoveryObservation::new("glutes", 70.0, 24.0 + i as f64, 60.0, 75.0))
            .collect();
        let update = estimator.update(&observations, &UserRecoveryPriors::default());

        let request = RecoveryEstimateRequest {
            muscle: "glutes".to_string(),
            priors: update.updated_priors.clone(),
            context: None,
        };
        let estimate = estimator.run_estimate(&request).unwrap();
        assert!(estimate.is_personalized);
        assert_eq!(estimate.confidence, ConfidenceTier::Medium);
        assert!((estimate.estimated_recovery_hours - update.personalized_hours["glutes"]).abs() < 1e-9);

        let other = estimator
            .run_estimate(&RecoveryEstimateRequest {
                muscle: "hamstrings".to_string(),
                priors: update.updated_priors,
                context: None,
            })
            .unwrap();
        assert!(!other.is_personalized);
        assert!((other.estimated_recovery_hours - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_b_fitness_outlasts_fatigue() {
        let request = SolveRequest {
            impulses: vec![TrainingImpulse::new(0.0, 50.0)],
            params: BanisterParams {
                p0: 50.0,
                k1: 1.0,
                k2: 2.0,
                tau1: 45.0 * 24.0,
                tau2: 15.0 * 24.0,
            },
            forecast_hours: 168.0,
            optimize_params: false,
            performance_observations: None,
        };

        let response = FitnessFatigueSolver::new().run(&request).unwrap();
        assert_eq!(response.timeline_hours.len(), 169);
        assert!(response.fitness[0].abs() < 1e-9);
        assert!(response.fatigue[0].abs() < 1e-9);

        let peak_index = |series: &[f64]| {
            series
                .iter()
                .enumerate()
                .fold(0, |best, (i, v)| if *v > series[best] { i } else { best })
        };
        let fitness_peak = peak_index(&response.fitness);
        let fatigue_peak = peak_index(&response.fatigue);
        assert!(fitness_peak > 0 && fitness_peak < 10);
        assert!(fatigue_peak > 0 && fatigue_peak < 10);

        let last = response.timeline_hours.len() - 1;
        let fitness_ratio = response.fitness[last] / response.fitness[fitness_peak];
        let fatigue_ratio = response.fatigue[last] / response.fatigue[fatigue_peak];
        assert!(fatigue_ratio < fitness_ratio);
        assert!(fitness_ratio < 1.0);
    }

    #[test]
    fn test_solve_request_json_defaults() {
        let request: SolveRequest = serde_json::from_str(
            r#"{ "training_history": [{ "timestamp_hours": 0, "impulse": 40 }] }"#,
        )
        .unwrap();
        assert_eq!(request.forecast_hours, 168.0);
        assert_eq!(request.params, BanisterParams::default());
        assert!(!request.optimize_params);

        let response = FitnessFatigueSolver::new().run(&request).unwrap();
        assert_eq!(response.timeline_hours.len(), 169);
        assert!(response.optimal_params.is_none());
        assert!(response.predicted_peak_performance_hour.is_some());
    }

    #[test]
    fn test_invalid_params_rejected_at_boundary() {
        let request = SolveRequest {
            impulses: vec![TrainingImpulse::new(0.0, 50.0)],
            params: BanisterParams {
                tau1: 10.0,
                tau2: 12.0,
                ..BanisterParams::default()
            },
            forecast_hours: 48.0,
            optimize_params: false,
            performance_observations: None,
        };
        let err = FitnessFatigueSolver::new().run(&request).unwrap_err();
        assert!(matches!(err, AdaptError::Validation(_)));
    }

    #[test]
    fn test_fatigue_cold_start_forecast() {
        let regressor = FatigueCurveRegressor::new();
        let request = FatiguePredictionRequest {
            context: Some(FatigueContext::default()),
            ..FatiguePredictionRequest::default()
        };

        let curve = regressor.run(&request).unwrap();
        assert_eq!(curve.model_source, ModelSource::SyntheticPrior);
        assert_eq!(curve.hours.len(), 11);
        for i in 0..curve.hours.len() {
            assert!((0.0..=1.0).contains(&curve.mean_fatigue[i]));
            assert!(curve.lower_bound[i] <= curve.mean_fatigue[i] + 1e-12);
            assert!(curve.upper_bound[i] + 1e-12 >= curve.mean_fatigue[i]);
        }
        assert!(curve.peak_fatigue_hour <= 24.0);
        assert!(curve.full_recovery_hour > curve.peak_fatigue_hour);

        // Cold start tracks the exponential baseline: 0.8 at hour 6, cleared by hour 72
        assert_eq!(curve.peak_fatigue_hour, 6.0);
        assert!((curve.mean_fatigue[1] - 0.8).abs() < 0.1);
        assert!(curve.mean_fatigue[8] < 0.05);
        assert!(curve.full_recovery_hour <= 72.0);
    }

    #[test]
    fn test_multi_system_request() {
        let request: MultiSystemRequest = serde_json::from_str(
            r#"{
                "impulses": [
                    { "timestamp_hours": 0, "impulse": 60, "cns_impulse": 80 },
                    { "timestamp_hours": 48, "impulse": 60, "spinal_impulse": 30 }
                ],
                "forecast_hours": 168
            }"#,
        )
        .unwrap();

        let response = FitnessFatigueSolver::new().run_multi_system(&request).unwrap();
        assert_eq!(response.systems.len(), 3);
        assert_eq!(response.combined_performance.len(), 29);
        assert!(response.system(BodySystem::Neural).is_some());
        assert!(!response.verdict_text.is_empty());

        let muscular = response.system(BodySystem::Muscular).unwrap();
        let neural = response.system(BodySystem::Neural).unwrap();
        let connective = response.system(BodySystem::Connective).unwrap();
        let expected = 0.4 * muscular.performance[10]
            + 0.35 * neural.performance[10]
            + 0.25 * connective.performance[10];
        assert!((response.combined_performance[10] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_c_perfect_predictions() {
        let values = [62.0, 70.0, 55.0, 81.0, 74.0];
        let request = SelfImprovementRequest {
            predictions: values
                .iter()
                .enumerate()
                .map(|(i, v)| prediction(i, "muscular", *v))
                .collect(),
            outcomes: values.iter().enumerate().map(|(i, v)| outcome(i, *v)).collect(),
        };

        let report = SelfImprovementEvaluator::new().run(&request).unwrap();
        let accuracy = &report.accuracy_by_system[0];
        assert_eq!(accuracy.sample_size, 5);
        assert_eq!(accuracy.bias, 0.0);
        assert_eq!(accuracy.mae, 0.0);
        assert_eq!(accuracy.rmse, 0.0);
        assert!((accuracy.r_squared - 1.0).abs() < 1e-12);
        assert!(report.suggested_adjustments.is_empty());
        assert_eq!(report.overall_prediction_score, 100.0);
    }

    #[test]
    fn test_full_recalibration_cycle() {
        let config = AppConfig::default();

        // 1. Learn recovery priors from logged sessions
        let estimator = config.recovery_estimator();
        let observations = vec![
            RecoveryObservation::new("cuádriceps", 60.0, 48.0, 70.0, 50.0),
            RecoveryObservation::new("pectorales", 50.0, 24.0, 60.0, 80.0),
            RecoveryObservation::new("pectorales", 0.0, 24.0, 60.0, 80.0),
        ];
        let update = estimator.update(&observations, &UserRecoveryPriors::default());
        assert_eq!(update.accepted_observations, 2);
        assert_eq!(update.skipped_observations, 1);

        // 2. Forecast performance for the coming week
        let solver = config.solver();
        let impulses = vec![
            TrainingImpulse::new(0.0, 70.0),
            TrainingImpulse::new(48.0, 55.0),
        ];
        let forecast = solver.solve_multi_system(&impulses, 168.0).unwrap();
        assert_eq!(forecast.systems.len(), 3);

        // 3. Score the predictions that were made against what happened
        let mut predictions = Vec::new();
        let mut outcomes = Vec::new();
        for i in 0..4 {
            predictions.push(prediction(i, "cns", 70.0 + i as f64));
            outcomes.push(outcome(i, 62.0 + i as f64));
        }
        for i in 4..8 {
            predictions.push(prediction(i, "muscular", 60.0 + i as f64));
            outcomes.push(outcome(i, 60.0 + i as f64));
        }

        let request = CorrectionRequest {
            predictions,
            outcomes,
            current_calibration: Some(CalibrationDeltas {
                cns_delta: 1.0,
                muscular_delta: 0.0,
                spinal_delta: -2.0,
            }),
        };
        let response = config.evaluator().run_corrections(&request).unwrap();

        // cns overestimates by 8: -0.25 * 8 + 0.7 * 1.0
        assert!((response.corrections.cns_delta + 1.3).abs() < 1e-9);
        assert!(response.corrections.muscular_delta.abs() < 1e-9);
        assert!((response.corrections.spinal_delta + 1.4).abs() < 1e-9);
        assert!((response.accuracy_score - 80.0).abs() < 1e-9);
        assert!(response
            .details
            .suggested_adjustments
            .contains_key("cns_bias_correction"));
        assert!(response.details.recommendations[0].contains("overestimating"));

        // 4. The calibration renders for the client
        let mut out = Vec::new();
        render(&response, ExportFormat::Json, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["corrections"]["cnsDelta"], -1.3);
        assert_eq!(json["accuracy_score"], 80.0);
    }

    #[test]
    fn test_every_result_renders_in_every_format() {
        let solver = FitnessFatigueSolver::new();
        let response = solver
            .solve(&[TrainingImpulse::new(0.0, 50.0)], &BanisterParams::default(), 200.0, 1.0)
            .unwrap();

        for format in [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Text] {
            let mut out = Vec::new();
            render(&response, format, &mut out).unwrap();
            assert!(!out.is_empty(), "{:?} produced no output", format);
        }
    }
}
