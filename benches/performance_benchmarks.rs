use adaptrs::banister::{BanisterParams, FitnessFatigueSolver, PerformanceObservation, TrainingImpulse};
use adaptrs::fatigue::{FatigueContext, FatigueCurveRegressor, DEFAULT_PREDICTION_HOURS};
use adaptrs::recovery::{RecoveryEstimator, RecoveryObservation, UserRecoveryPriors};
use adaptrs::self_improvement::{OutcomeRecord, PredictionRecord, SelfImprovementEvaluator};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

/// Performance benchmarks for the adaptive models
///
/// Each benchmark scales the input size to check that the numerical core
/// stays well inside interactive latency.

const MUSCLES: [&str; 6] = ["quadriceps", "glutes", "hamstrings", "chest", "lats", "calves"];

fn create_observations(count: usize) -> Vec<RecoveryObservation> {
    (0..count)
        .map(|i| {
            RecoveryObservation::new(
                MUSCLES[i % MUSCLES.len()],
                40.0 + (i % 7) as f64 * 8.0,
                12.0 + (i % 9) as f64 * 6.0,
                65.0,
                45.0 + (i % 5) as f64 * 9.0,
            )
        })
        .collect()
}

/// Training block with a session every other day
fn create_training_block(days: usize) -> Vec<TrainingImpulse> {
    (0..days)
        .step_by(2)
        .map(|day| TrainingImpulse::new(day as f64 * 24.0, 40.0 + (day % 3) as f64 * 15.0))
        .collect()
}

fn bench_recovery_update(c: &mut Criterion) {
    let estimator = RecoveryEstimator::new();
    let mut group = c.benchmark_group("Recovery Update");

    for &size in &[1, 10, 100, 1000] {
        let observations = create_observations(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("update", size),
            &observations,
            |b, observations| {
                b.iter(|| estimator.update(black_box(observations), &UserRecoveryPriors::default()));
            },
        );
    }

    group.finish();
}

fn bench_fatigue_regression(c: &mut Criterion) {
    let regressor = FatigueCurveRegressor::new();
    let mut group = c.benchmark_group("Fatigue Regression");
    group.sample_size(10);

    group.bench_function("fit_synthetic_prior", |b| {
        b.iter(|| regressor.prior_model());
    });

    if let Ok(model) = regressor.prior_model() {
        let context = FatigueContext::default();
        group.bench_function("predict_default_hours", |b| {
            b.iter(|| {
                regressor.predict(
                    &model,
                    black_box(&DEFAULT_PREDICTION_HOURS),
                    50.0,
                    &context,
                )
            });
        });
    }

    group.finish();
}

fn bench_ode_solve(c: &mut Criterion) {
    let solver = FitnessFatigueSolver::new();
    let params = BanisterParams::default();
    let mut group = c.benchmark_group("Fitness-Fatigue Solve");

    for &days in &[7, 28, 90] {
        let impulses = create_training_block(days);
        let horizon = days as f64 * 24.0 + 168.0;

        group.throughput(Throughput::Elements(impulses.len() as u64));
        group.bench_with_input(BenchmarkId::new("solve", days), &impulses, |b, impulses| {
            b.iter(|| solver.solve(black_box(impulses), &params, horizon, 1.0));
        });
        group.bench_with_input(
            BenchmarkId::new("solve_multi_system", days),
            &impulses,
            |b, impulses| {
                b.iter(|| solver.solve_multi_system(black_box(impulses), horizon));
            },
        );
    }

    group.finish();
}

fn bench_parameter_fit(c: &mut Criterion) {
    let solver = FitnessFatigueSolver::new();
    let impulses = create_training_block(14);
    let truth = BanisterParams {
        p0: 55.0,
        k1: 1.2,
        k2: 2.5,
        tau1: 60.0,
        tau2: 12.0,
    };

    let observations: Vec<PerformanceObservation> = match solver.solve(&impulses, &truth, 14.0 * 24.0, 1.0) {
        Ok(response) => response
            .timeline_hours
            .iter()
            .zip(&response.performance)
            .step_by(24)
            .map(|(t, p)| PerformanceObservation {
                time_hours: *t,
                performance: *p,
            })
            .collect(),
        Err(_) => return,
    };

    let mut group = c.benchmark_group("Parameter Fit");
    group.sample_size(10);
    group.bench_function("optimize_params_14_days", |b| {
        b.iter(|| {
            solver.optimize_params(
                black_box(&impulses),
                black_box(&observations),
                &BanisterParams::default(),
            )
        });
    });
    group.finish();
}

fn bench_self_improvement(c: &mut Criterion) {
    let evaluator = SelfImprovementEvaluator::new();
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let systems = ["cns", "muscular", "spinal"];
    let mut group = c.benchmark_group("Self Improvement");

    for &size in &[30, 300, 3000] {
        let predictions: Vec<PredictionRecord> = (0..size)
            .map(|i| PredictionRecord {
                prediction_id: format!("p{}", i),
                timestamp: start + Duration::hours(i as i64),
                muscle: None,
                system: systems[i % systems.len()].to_string(),
                predicted_value: 50.0 + (i % 11) as f64 * 3.0,
                context: BTreeMap::new(),
            })
            .collect();
        let outcomes: Vec<OutcomeRecord> = (0..size)
            .map(|i| OutcomeRecord {
                prediction_id: format!("p{}", i),
                actual_value: 48.0 + (i % 13) as f64 * 3.0,
                feedback_source: "bench".to_string(),
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("evaluate", size),
            &(predictions, outcomes),
            |b, (predictions, outcomes)| {
                b.iter(|| evaluator.evaluate(black_box(predictions), black_box(outcomes)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_recovery_update,
    bench_fatigue_regression,
    bench_ode_solve,
    bench_parameter_fit,
    bench_self_improvement
);
criterion_main!(benches);
