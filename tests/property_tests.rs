use adaptrs::banister::{BanisterParams, FitnessFatigueSolver, TrainingImpulse};
use adaptrs::fatigue::{FatigueContext, FatigueCurveRegressor, FatigueModel};
use adaptrs::recovery::{
    GammaPrior, NutritionStatus, RecoveryContext, RecoveryEstimator, RecoveryObservation,
    UserRecoveryPriors,
};
use adaptrs::self_improvement::ModelAccuracy;
use proptest::prelude::*;
use std::sync::OnceLock;

fn prior_model() -> &'static FatigueModel {
    static MODEL: OnceLock<FatigueModel> = OnceLock::new();
    MODEL.get_or_init(|| {
        FatigueCurveRegressor::new()
            .prior_model()
            .expect("synthetic prior must fit")
    })
}

fn nutrition() -> impl Strategy<Value = NutritionStatus> {
    prop_oneof![
        Just(NutritionStatus::Deficit),
        Just(NutritionStatus::Maintenance),
        Just(NutritionStatus::Surplus),
    ]
}

fn observation() -> impl Strategy<Value = RecoveryObservation> {
    (1.0f64..120.0, 0.5f64..200.0, 0.0f64..100.0, 0.0f64..100.0).prop_map(
        |(stress, hours, predicted, actual)| {
            RecoveryObservation::new("quadriceps", stress, hours, predicted, actual)
        },
    )
}

proptest! {
    #[test]
    fn test_implied_recovery_hours_clamped(obs in observation()) {
        let estimator = RecoveryEstimator::new();
        let implied = estimator.implied_recovery_hours(&obs);

        // Positive stress and elapsed time always give a usable observation
        prop_assert!(implied.is_some());
        let implied = implied.unwrap();
        prop_assert!((6.0..=200.0).contains(&implied));
    }

    #[test]
    fn test_alpha_increments_once_per_accepted_observation(
        observations in prop::collection::vec(observation(), 1..25)
    ) {
        let estimator = RecoveryEstimator::new();
        let start = UserRecoveryPriors::default();
        let update = estimator.update(&observations, &start);

        let prior = update.updated_priors.get("quadriceps").unwrap();
        prop_assert_eq!(update.accepted_observations, observations.len());
        prop_assert!((prior.alpha - (2.0 + observations.len() as f64)).abs() < 1e-9);
        prop_assert_eq!(update.updated_priors.total_observations as usize, observations.len());
        prop_assert!(start.muscle_priors.is_empty());
    }

    #[test]
    fn test_posterior_mean_between_prior_and_observation(
        alpha in 1.0f64..30.0,
        hours in 6.0f64..200.0,
        implied in 6.0f64..200.0,
    ) {
        let prior = GammaPrior::centred_on(hours, alpha);
        let posterior = prior.observe(implied);

        let lo = hours.min(implied) - 1e-9;
        let hi = hours.max(implied) + 1e-9;
        prop_assert!(posterior.expected_hours() >= lo && posterior.expected_hours() <= hi);
    }

    #[test]
    fn test_context_multiplier_floor(
        nutrition in nutrition(),
        stress in 1.0f64..5.0,
        sleep in 3.0f64..11.0,
        age in 16.0f64..80.0,
    ) {
        let ctx = RecoveryContext {
            nutrition_status: nutrition,
            stress_level: stress,
            sleep_hours: sleep,
            age,
        };
        prop_assert!(ctx.multiplier() >= 0.5);
    }

    #[test]
    fn test_estimate_is_idempotent(
        observations in prop::collection::vec(observation(), 0..10),
        sleep in 4.0f64..10.0,
    ) {
        let estimator = RecoveryEstimator::new();
        let priors = estimator
            .update(&observations, &UserRecoveryPriors::default())
            .updated_priors;
        let ctx = RecoveryContext { sleep_hours: sleep, ..RecoveryContext::default() };

        let first = estimator.estimate("quadriceps", &priors, Some(&ctx));
        let second = estimator.estimate("quadriceps", &priors, Some(&ctx));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_projected_params_keep_tau_order(
        p0 in 0.0f64..150.0,
        k1 in -2.0f64..5.0,
        k2 in -2.0f64..5.0,
        tau1 in -10.0f64..2000.0,
        tau2 in -10.0f64..2000.0,
    ) {
        let params = BanisterParams::from_vector_clamped(&[p0, k1, k2, tau1, tau2]);
        prop_assert!(params.tau1 > params.tau2);
        prop_assert!(params.tau2 >= 2.0);
        prop_assert!(params.k1 >= 0.01 && params.k2 >= 0.01);
        prop_assert!(params.validate().is_ok());
    }

    #[test]
    fn test_accuracy_statistics_ordering(
        pairs in prop::collection::vec((0.0f64..100.0, 0.0f64..100.0), 2..40)
    ) {
        let accuracy = ModelAccuracy::from_pairs("muscular", &pairs);
        prop_assert!(accuracy.mae >= 0.0);
        prop_assert!(accuracy.rmse + 1e-9 >= accuracy.mae);
        prop_assert!(accuracy.bias.abs() <= accuracy.mae + 1e-9);
        prop_assert!(accuracy.r_squared <= 1.0 + 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_empty_solve_is_flat(p0 in -50.0f64..200.0, horizon in 1.0f64..400.0) {
        let params = BanisterParams { p0, ..BanisterParams::default() };
        let response = FitnessFatigueSolver::new().solve(&[], &params, horizon, 1.0).unwrap();

        prop_assert!(response.performance.iter().all(|p| *p == p0));
        prop_assert!(response.next_optimal_session_hour.is_none());
        prop_assert!(response.predicted_peak_performance_hour.is_none());
    }

    #[test]
    fn test_solve_timeline_shape(
        sessions in prop::collection::vec((0.0f64..96.0, 5.0f64..150.0), 1..5),
        horizon in 24.0f64..200.0,
    ) {
        let impulses: Vec<TrainingImpulse> = sessions
            .iter()
            .map(|(t, m)| TrainingImpulse::new(*t, *m))
            .collect();
        let response = FitnessFatigueSolver::new()
            .solve(&impulses, &BanisterParams::default(), horizon, 1.0)
            .unwrap();

        let samples = horizon.floor() as usize + 1;
        prop_assert_eq!(response.timeline_hours.len(), samples);
        prop_assert_eq!(response.performance.len(), samples);
        prop_assert!(response.fitness.iter().all(|f| *f >= -1e-6));
        prop_assert!(response.fatigue.iter().all(|f| *f >= -1e-6));
    }

    #[test]
    fn test_fatigue_curve_within_unit_interval(
        stress in 0.0f64..150.0,
        sleep in 4.0f64..10.0,
        stress_level in 1.0f64..5.0,
        age in 16.0f64..70.0,
        compound in any::<bool>(),
        hours in prop::collection::vec(0.0f64..240.0, 1..12),
    ) {
        let ctx = FatigueContext {
            sleep_hours: sleep,
            nutrition_status: NutritionStatus::Maintenance,
            stress_level,
            age,
            is_compound_dominant: compound,
        };
        let curve = FatigueCurveRegressor::new()
            .predict(prior_model(), &hours, stress, &ctx)
            .unwrap();

        for i in 0..hours.len() {
            prop_assert!((0.0..=1.0).contains(&curve.mean_fatigue[i]));
            prop_assert!((0.0..=1.0).contains(&curve.lower_bound[i]));
            prop_assert!((0.0..=1.0).contains(&curve.upper_bound[i]));
            prop_assert!(curve.lower_bound[i] <= curve.upper_bound[i]);
        }
        prop_assert!(curve.supercompensation_hour.is_none());
    }
}
