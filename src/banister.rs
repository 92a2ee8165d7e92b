//! Fitness-fatigue impulse-response model
//!
//! Performance is the net result of two antagonistic processes driven by the
//! same training forcing `w(t)`:
//!
//! ```text
//! dFitness/dt = -Fitness/τ1 + w(t)
//! dFatigue/dt = -Fatigue/τ2 + w(t)
//! Performance(t) = p0 + k1·Fitness(t) - k2·Fatigue(t)
//! ```
//!
//! With τ1 > τ2 fatigue clears faster than fitness, which is why performance
//! rises once training stops (supercompensation after a deload).
//!
//! Discrete sessions become Gaussian pulses before integration, and the
//! integration starts one hour before the first session so the zero initial
//! state is seeded ahead of any forcing.
//!
//! The three-system extension runs independent solves for muscular, neural
//! and connective tissue with literature time constants and combines them
//! into a single readiness-like performance curve.

use crate::error::{AdaptError, Result};
use crate::ode::{DormandPrince, IntegratorConfig};
use crate::optimize::{Minimizer, NelderMead, NelderMeadConfig};
use crate::precision::{round_series, round_to};
use crate::validation::{require_finite, require_positive, Validate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Objective value used when a trial parameter set cannot be simulated
const FAILED_OBJECTIVE: f64 = 1e10;

/// Sampling step of the parameter-fit simulation; observation times index
/// the simulated series in whole hours
const FIT_STEP_HOURS: f64 = 1.0;

/// Pulses further than this many widths away contribute nothing measurable
const PULSE_CUTOFF_WIDTHS: f64 = 8.0;

/// Longest forecast a request may ask for (ten years)
pub const MAX_FORECAST_HOURS: f64 = 87_600.0;

/// One training session as a forcing term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingImpulse {
    /// Session time in hours
    pub timestamp_hours: f64,

    /// Session magnitude (TRIMP-like stress)
    pub impulse: f64,

    /// Neural-system magnitude, if measured separately
    #[serde(default, alias = "cns_impulse")]
    pub neural_impulse: Option<f64>,

    /// Connective/spinal magnitude, if measured separately
    #[serde(default, alias = "spinal_impulse")]
    pub connective_impulse: Option<f64>,
}

impl TrainingImpulse {
    pub fn new(timestamp_hours: f64, impulse: f64) -> Self {
        TrainingImpulse {
            timestamp_hours,
            impulse,
            neural_impulse: None,
            connective_impulse: None,
        }
    }
}

/// ODE time constants and linear readout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanisterParams {
    /// Baseline performance
    pub p0: f64,

    /// Fitness gain
    pub k1: f64,

    /// Fatigue gain
    pub k2: f64,

    /// Fitness time constant in hours
    pub tau1: f64,

    /// Fatigue time constant in hours
    pub tau2: f64,
}

impl Default for BanisterParams {
    fn default() -> Self {
        BanisterParams {
            p0: 50.0,
            k1: 1.0,
            k2: 2.0,
            tau1: 45.0,
            tau2: 15.0,
        }
    }
}

impl BanisterParams {
    /// Performance readout for a fitness/fatigue state
    pub fn performance(&self, fitness: f64, fatigue: f64) -> f64 {
        self.p0 + self.k1 * fitness - self.k2 * fatigue
    }

    /// Flatten into the optimizer's parameter vector
    pub fn to_vector(&self) -> Vec<f64> {
        vec![self.p0, self.k1, self.k2, self.tau1, self.tau2]
    }

    /// Rebuild from an optimizer vector, projecting onto the feasible box:
    /// k1, k2 ≥ 0.01; τ1 ≥ 5; 2 ≤ τ2 ≤ τ1 - 1
    pub fn from_vector_clamped(x: &[f64]) -> Self {
        let tau1 = x[3].max(5.0);
        BanisterParams {
            p0: x[0],
            k1: x[1].max(0.01),
            k2: x[2].max(0.01),
            tau1,
            tau2: x[4].min(tau1 - 1.0).max(2.0),
        }
    }

    /// Reject parameter sets the model cannot represent
    pub fn validate(&self) -> Result<()> {
        require_finite("params.p0", self.p0)?;
        require_finite("params.k1", self.k1)?;
        require_finite("params.k2", self.k2)?;
        require_positive("params.tau1", self.tau1)?;
        require_positive("params.tau2", self.tau2)?;
        if self.tau1 <= self.tau2 {
            return Err(AdaptError::validation(format!(
                "fitness time constant tau1 ({}) must exceed fatigue time constant tau2 ({})",
                self.tau1, self.tau2
            )));
        }
        Ok(())
    }

    pub fn rounded(&self) -> Self {
        BanisterParams {
            p0: round_to(self.p0, 1),
            k1: round_to(self.k1, 3),
            k2: round_to(self.k2, 3),
            tau1: round_to(self.tau1, 1),
            tau2: round_to(self.tau2, 1),
        }
    }
}

/// Observed performance used for parameter fitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceObservation {
    pub time_hours: f64,
    pub performance: f64,
}

/// Continuous forcing built from discrete sessions
///
/// Each session is a unit-area Gaussian pulse scaled by its magnitude, so the
/// forcing integrates to the total session stress.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseForcing {
    times: Vec<f64>,
    magnitudes: Vec<f64>,
    sigma: f64,
}

impl ImpulseForcing {
    pub fn new(impulses: &[TrainingImpulse], sigma: f64) -> Self {
        ImpulseForcing {
            times: impulses.iter().map(|i| i.timestamp_hours).collect(),
            magnitudes: impulses.iter().map(|i| i.impulse).collect(),
            sigma,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Forcing w(t)
    pub fn value(&self, t: f64) -> f64 {
        let norm = 1.0 / (self.sigma * (2.0 * PI).sqrt());
        self.times
            .iter()
            .zip(&self.magnitudes)
            .filter_map(|(center, magnitude)| {
                let z = (t - center) / self.sigma;
                (z.abs() <= PULSE_CUTOFF_WIDTHS).then(|| magnitude * norm * (-0.5 * z * z).exp())
            })
            .sum()
    }
}

/// Fitness-fatigue solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Gaussian pulse width in hours
    pub pulse_width_hours: f64,

    /// Integration starts this long before the first session
    pub lead_in_hours: f64,

    /// Default sampling step of the reported timeline
    pub step_hours: f64,

    /// Default forecast horizon
    pub forecast_hours: f64,

    /// Sampling step of the three-system solve
    pub multi_system_step_hours: f64,

    /// Ceiling on reported samples per solve
    pub max_samples: usize,

    /// Padding after the last observation when fitting parameters
    pub fit_padding_hours: f64,

    /// Observations required before parameters are fitted
    pub min_fit_observations: usize,

    pub integrator: IntegratorConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            pulse_width_hours: 1.0,
            lead_in_hours: 1.0,
            step_hours: 1.0,
            forecast_hours: 168.0,
            multi_system_step_hours: 6.0,
            max_samples: 200_000,
            fit_padding_hours: 24.0,
            min_fit_observations: 3,
            integrator: IntegratorConfig::default(),
        }
    }
}

/// Timeline produced by a single-system solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanisterResponse {
    /// Hours since the integration start (one lead-in before the first session)
    pub timeline_hours: Vec<f64>,
    pub fitness: Vec<f64>,
    pub fatigue: Vec<f64>,
    pub performance: Vec<f64>,
    #[serde(default)]
    pub optimal_params: Option<BanisterParams>,
    #[serde(default)]
    pub next_optimal_session_hour: Option<f64>,
    #[serde(default)]
    pub predicted_peak_performance_hour: Option<f64>,
}

impl BanisterResponse {
    /// Copy rounded for presentation
    pub fn rounded(&self) -> Self {
        BanisterResponse {
            timeline_hours: round_series(&self.timeline_hours, 1),
            fitness: round_series(&self.fitness, 2),
            fatigue: round_series(&self.fatigue, 2),
            performance: round_series(&self.performance, 1),
            optimal_params: self.optimal_params.as_ref().map(BanisterParams::rounded),
            next_optimal_session_hour: self.next_optimal_session_hour.map(|h| round_to(h, 1)),
            predicted_peak_performance_hour: self
                .predicted_peak_performance_hour
                .map(|h| round_to(h, 1)),
        }
    }
}

fn default_forecast_hours() -> f64 {
    168.0
}

/// Request payload for a single-system solve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    #[serde(alias = "training_history")]
    pub impulses: Vec<TrainingImpulse>,
    #[serde(default)]
    pub params: BanisterParams,
    #[serde(default = "default_forecast_hours")]
    pub forecast_hours: f64,
    #[serde(default)]
    pub optimize_params: bool,
    #[serde(default)]
    pub performance_observations: Option<Vec<PerformanceObservation>>,
}

impl Validate for SolveRequest {
    fn validate(&self) -> Result<()> {
        validate_impulses(&self.impulses)?;
        self.params.validate()?;
        validate_forecast_hours(self.forecast_hours)?;
        for (i, obs) in self.performance_observations.iter().flatten().enumerate() {
            require_finite(&format!("performance_observations[{}].time_hours", i), obs.time_hours)?;
            require_finite(
                &format!("performance_observations[{}].performance", i),
                obs.performance,
            )?;
        }
        Ok(())
    }
}

/// Request payload for the three-system solve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSystemRequest {
    #[serde(alias = "training_history")]
    pub impulses: Vec<TrainingImpulse>,
    #[serde(default = "default_forecast_hours")]
    pub forecast_hours: f64,
}

impl Validate for MultiSystemRequest {
    fn validate(&self) -> Result<()> {
        validate_impulses(&self.impulses)?;
        validate_forecast_hours(self.forecast_hours)
    }
}

fn validate_forecast_hours(hours: f64) -> Result<()> {
    require_positive("forecast_hours", hours)?;
    if hours > MAX_FORECAST_HOURS {
        return Err(AdaptError::validation(format!(
            "forecast_hours must be at most {}, got {}",
            MAX_FORECAST_HOURS, hours
        )));
    }
    Ok(())
}

fn validate_impulses(impulses: &[TrainingImpulse]) -> Result<()> {
    for (i, imp) in impulses.iter().enumerate() {
        require_finite(&format!("impulses[{}].timestamp_hours", i), imp.timestamp_hours)?;
        require_finite(&format!("impulses[{}].impulse", i), imp.impulse)?;
        if let Some(v) = imp.neural_impulse {
            require_finite(&format!("impulses[{}].neural_impulse", i), v)?;
        }
        if let Some(v) = imp.connective_impulse {
            require_finite(&format!("impulses[{}].connective_impulse", i), v)?;
        }
    }
    Ok(())
}

/// Physiological subsystem of the three-system model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySystem {
    Muscular,
    Neural,
    Connective,
}

impl BodySystem {
    pub const ALL: [BodySystem; 3] = [
        BodySystem::Muscular,
        BodySystem::Neural,
        BodySystem::Connective,
    ];

    /// Literature time constants (days converted to hours) and gains
    pub fn params(&self) -> BanisterParams {
        match self {
            BodySystem::Muscular => BanisterParams {
                p0: 100.0,
                k1: 0.8,
                k2: 1.5,
                tau1: 42.0 * 24.0,
                tau2: 12.0 * 24.0,
            },
            BodySystem::Neural => BanisterParams {
                p0: 100.0,
                k1: 1.0,
                k2: 2.0,
                tau1: 35.0 * 24.0,
                tau2: 8.0 * 24.0,
            },
            BodySystem::Connective => BanisterParams {
                p0: 100.0,
                k1: 0.5,
                k2: 1.2,
                tau1: 60.0 * 24.0,
                tau2: 20.0 * 24.0,
            },
        }
    }

    /// Share of the combined performance readout
    pub fn weight(&self) -> f64 {
        match self {
            BodySystem::Muscular => 0.4,
            BodySystem::Neural => 0.35,
            BodySystem::Connective => 0.25,
        }
    }

    /// Session magnitude seen by this system
    pub fn magnitude(&self, impulse: &TrainingImpulse) -> f64 {
        let specific = match self {
            BodySystem::Muscular => None,
            BodySystem::Neural => impulse.neural_impulse,
            BodySystem::Connective => impulse.connective_impulse,
        };
        match specific {
            Some(value) if value > 0.0 => value,
            _ => match self {
                BodySystem::Muscular => impulse.impulse,
                BodySystem::Neural => impulse.impulse * 0.8,
                BodySystem::Connective => impulse.impulse * 0.6,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BodySystem::Muscular => "muscular",
            BodySystem::Neural => "neural",
            BodySystem::Connective => "connective",
        }
    }
}

/// Qualitative reading of the combined fitness-fatigue balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingVerdict {
    SupercompensationWindow,
    DeloadNeeded,
    ReduceVolume,
    Stable,
    InsufficientData,
}

impl TrainingVerdict {
    /// Classify a combined performance curve by its level and trend
    pub fn from_combined(combined: &[f64]) -> Self {
        let (Some(first), Some(last)) = (combined.first(), combined.last()) else {
            return TrainingVerdict::InsufficientData;
        };
        let level = *first;
        let trend = last - first;

        if level > 105.0 && trend > 0.0 {
            TrainingVerdict::SupercompensationWindow
        } else if level < 90.0 {
            TrainingVerdict::DeloadNeeded
        } else if trend < -5.0 {
            TrainingVerdict::ReduceVolume
        } else {
            TrainingVerdict::Stable
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TrainingVerdict::SupercompensationWindow => {
                "Accumulated fitness outweighs residual fatigue. You are in a supercompensation window - a good moment to attempt PRs."
            }
            TrainingVerdict::DeloadNeeded => {
                "Accumulated fatigue dominates fitness. Take a deload or reduce frequency so the adaptations can be absorbed."
            }
            TrainingVerdict::ReduceVolume => {
                "Performance is trending down. You are accumulating more fatigue than you can process - consider cutting volume by about 30%."
            }
            TrainingVerdict::Stable => {
                "Your fitness-fatigue balance is stable. Keep following the current plan."
            }
            TrainingVerdict::InsufficientData => {
                "Not enough data to model the fitness-fatigue balance."
            }
        }
    }
}

/// One subsystem's timeline in the three-system solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResponse {
    pub system: BodySystem,
    #[serde(flatten)]
    pub response: BanisterResponse,
}

/// Result of the three-system solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSystemResponse {
    pub systems: Vec<SystemResponse>,
    pub combined_performance: Vec<f64>,
    pub optimal_next_session_hour: Option<f64>,
    pub verdict: TrainingVerdict,
    pub verdict_text: String,
}

impl MultiSystemResponse {
    pub fn system(&self, system: BodySystem) -> Option<&BanisterResponse> {
        self.systems
            .iter()
            .find(|s| s.system == system)
            .map(|s| &s.response)
    }

    pub fn rounded(&self) -> Self {
        MultiSystemResponse {
            systems: self
                .systems
                .iter()
                .map(|s| SystemResponse {
                    system: s.system,
                    response: s.response.rounded(),
                })
                .collect(),
            combined_performance: round_series(&self.combined_performance, 1),
            optimal_next_session_hour: self.optimal_next_session_hour.map(|h| round_to(h, 1)),
            verdict: self.verdict,
            verdict_text: self.verdict_text.clone(),
        }
    }
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if *v <= b => best,
            _ => Some((i, *v)),
        })
        .map(|(i, _)| i)
}

/// First local performance peak strictly after `after` (absolute hours):
/// rising into the sample and not falling out of it
fn first_peak_after(absolute_times: &[f64], series: &[f64], after: f64) -> Option<usize> {
    (1..series.len()).find(|&i| {
        absolute_times[i] > after
            && series[i] > series[i - 1]
            && (i + 1 >= series.len() || series[i] >= series[i + 1])
    })
}

/// Fitness-fatigue ODE solver
#[derive(Debug, Clone)]
pub struct FitnessFatigueSolver {
    config: SolverConfig,
    optimizer: NelderMead,
}

impl FitnessFatigueSolver {
    /// Create new solver with default configuration
    pub fn new() -> Self {
        FitnessFatigueSolver {
            config: SolverConfig::default(),
            optimizer: NelderMead::new(),
        }
    }

    /// Create new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        FitnessFatigueSolver {
            config,
            optimizer: NelderMead::new(),
        }
    }

    /// Replace the parameter-fit optimizer settings
    pub fn with_optimizer(mut self, config: NelderMeadConfig) -> Self {
        self.optimizer = NelderMead::with_config(config);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Continuous forcing for a set of sessions
    pub fn build_forcing(&self, impulses: &[TrainingImpulse]) -> ImpulseForcing {
        ImpulseForcing::new(impulses, self.config.pulse_width_hours)
    }

    /// Integrate the model over `horizon_hours`, sampled every `step_hours`
    pub fn solve(
        &self,
        impulses: &[TrainingImpulse],
        params: &BanisterParams,
        horizon_hours: f64,
        step_hours: f64,
    ) -> Result<BanisterResponse> {
        params.validate()?;
        require_positive("horizon_hours", horizon_hours)?;
        require_positive("step_hours", step_hours)?;

        // Counted in f64 so an enormous horizon cannot overflow the cast
        let steps = (horizon_hours / step_hours).floor();
        if steps + 1.0 > self.config.max_samples as f64 {
            return Err(AdaptError::validation(format!(
                "horizon of {} h at {} h steps needs {} samples (limit {})",
                horizon_hours,
                step_hours,
                steps + 1.0,
                self.config.max_samples
            )));
        }
        let samples = steps as usize + 1;
        let timeline: Vec<f64> = (0..samples).map(|i| i as f64 * step_hours).collect();

        if impulses.is_empty() {
            return Ok(BanisterResponse {
                fitness: vec![0.0; samples],
                fatigue: vec![0.0; samples],
                performance: vec![params.p0; samples],
                timeline_hours: timeline,
                optimal_params: None,
                next_optimal_session_hour: None,
                predicted_peak_performance_hour: None,
            });
        }

        let first_session = impulses
            .iter()
            .map(|i| i.timestamp_hours)
            .fold(f64::INFINITY, f64::min);
        let last_session = impulses
            .iter()
            .map(|i| i.timestamp_hours)
            .fold(f64::NEG_INFINITY, f64::max);
        let t_start = first_session - self.config.lead_in_hours;
        let t_eval: Vec<f64> = timeline.iter().map(|t| t_start + t).collect();

        let forcing = self.build_forcing(impulses);
        let integrator = DormandPrince::with_config(self.config.integrator.clone());
        let (tau1, tau2) = (params.tau1, params.tau2);

        let states = integrator.integrate(
            |t, y: &[f64; 2]| {
                let w = forcing.value(t);
                [-y[0] / tau1 + w, -y[1] / tau2 + w]
            },
            t_start,
            [0.0, 0.0],
            &t_eval,
        )?;

        let fitness: Vec<f64> = states.iter().map(|s| s[0]).collect();
        let fatigue: Vec<f64> = states.iter().map(|s| s[1]).collect();
        let performance: Vec<f64> = states
            .iter()
            .map(|s| params.performance(s[0], s[1]))
            .collect();

        let peak = argmax(&performance).map(|i| timeline[i]);
        let next_optimal =
            first_peak_after(&t_eval, &performance, last_session).map(|i| timeline[i]);

        debug!(
            sessions = impulses.len(),
            samples,
            peak_hour = ?peak,
            next_optimal_hour = ?next_optimal,
            "Fitness-fatigue model solved"
        );

        Ok(BanisterResponse {
            timeline_hours: timeline,
            fitness,
            fatigue,
            performance,
            optimal_params: None,
            next_optimal_session_hour: next_optimal,
            predicted_peak_performance_hour: peak,
        })
    }

    /// Fit parameters to observed performance
    ///
    /// Minimizes the squared error between simulated performance (sampled at
    /// each observation's rounded hour) and the observations. With fewer than
    /// the configured minimum of observations the initial parameters are
    /// returned unchanged.
    pub fn optimize_params(
        &self,
        impulses: &[TrainingImpulse],
        observations: &[PerformanceObservation],
        initial: &BanisterParams,
    ) -> BanisterParams {
        if observations.len() < self.config.min_fit_observations {
            debug!(
                observations = observations.len(),
                "Too few performance observations, keeping initial parameters"
            );
            return initial.clone();
        }

        let last_observation = observations
            .iter()
            .map(|o| o.time_hours)
            .fold(f64::NEG_INFINITY, f64::max);
        let horizon = last_observation + self.config.fit_padding_hours;

        let objective = |x: &[f64]| -> f64 {
            let trial = BanisterParams::from_vector_clamped(x);
            match self.solve(impulses, &trial, horizon, FIT_STEP_HOURS) {
                Ok(result) => {
                    let last = result.performance.len().saturating_sub(1);
                    observations
                        .iter()
                        .map(|obs| {
                            let idx = obs.time_hours.round().clamp(0.0, last as f64) as usize;
                            (result.performance[idx] - obs.performance).powi(2)
                        })
                        .sum()
                }
                Err(err) => {
                    warn!(error = %err, "Trial parameters could not be simulated");
                    FAILED_OBJECTIVE
                }
            }
        };

        let start = initial.to_vector();
        let start_value = objective(&start);
        let result = self.optimizer.minimize(objective, &start);

        debug!(
            start_sse = start_value,
            fitted_sse = result.value,
            iterations = result.iterations,
            converged = result.converged,
            "Fitness-fatigue parameter fit finished"
        );

        if result.converged || result.value < start_value {
            BanisterParams::from_vector_clamped(&result.x)
        } else {
            initial.clone()
        }
    }

    /// Handle a validated single-system request, fitting first if asked
    pub fn run(&self, request: &SolveRequest) -> Result<BanisterResponse> {
        request.validate()?;

        let params = match (&request.performance_observations, request.optimize_params) {
            (Some(observations), true) => {
                self.optimize_params(&request.impulses, observations, &request.params)
            }
            _ => request.params.clone(),
        };

        let mut response = self.solve(
            &request.impulses,
            &params,
            request.forecast_hours,
            self.config.step_hours,
        )?;
        if request.optimize_params {
            response.optimal_params = Some(params);
        }
        Ok(response)
    }

    /// Solve the muscular, neural and connective systems and combine them
    pub fn solve_multi_system(
        &self,
        impulses: &[TrainingImpulse],
        horizon_hours: f64,
    ) -> Result<MultiSystemResponse> {
        let step = self.config.multi_system_step_hours;

        let responses: Vec<BanisterResponse> = BodySystem::ALL
            .as_slice()
            .par_iter()
            .map(|system| {
                let system_impulses: Vec<TrainingImpulse> = impulses
                    .iter()
                    .map(|imp| TrainingImpulse::new(imp.timestamp_hours, system.magnitude(imp)))
                    .collect();
                self.solve(&system_impulses, &system.params(), horizon_hours, step)
            })
            .collect::<Result<Vec<_>>>()?;

        let samples = responses.iter().map(|r| r.performance.len()).min().unwrap_or(0);
        let combined: Vec<f64> = (0..samples)
            .map(|i| {
                BodySystem::ALL
                    .iter()
                    .zip(&responses)
                    .map(|(system, r)| system.weight() * r.performance[i])
                    .sum()
            })
            .collect();

        let optimal_next = if impulses.is_empty() {
            None
        } else {
            let first_session = impulses
                .iter()
                .map(|i| i.timestamp_hours)
                .fold(f64::INFINITY, f64::min);
            let last_session = impulses
                .iter()
                .map(|i| i.timestamp_hours)
                .fold(f64::NEG_INFINITY, f64::max);
            let t_start = first_session - self.config.lead_in_hours;
            let timeline = &responses[0].timeline_hours[..samples];
            let absolute: Vec<f64> = timeline.iter().map(|t| t_start + t).collect();
            first_peak_after(&absolute, &combined, last_session).map(|i| timeline[i])
        };

        let verdict = TrainingVerdict::from_combined(&combined);
        debug!(verdict = ?verdict, optimal_next = ?optimal_next, "Three-system model solved");

        Ok(MultiSystemResponse {
            systems: BodySystem::ALL
                .iter()
                .zip(responses)
                .map(|(system, response)| SystemResponse {
                    system: *system,
                    response,
                })
                .collect(),
            combined_performance: combined,
            optimal_next_session_hour: optimal_next,
            verdict,
            verdict_text: verdict.description().to_string(),
        })
    }

    /// Handle a validated three-system request
    pub fn run_multi_system(&self, request: &MultiSystemRequest) -> Result<MultiSystemResponse> {
        request.validate()?;
        self.solve_multi_system(&request.impulses, request.forecast_hours)
    }
}

impl Default for FitnessFatigueSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{ContinuousCDF, Normal};

    fn sse(
        solver: &FitnessFatigueSolver,
        impulses: &[TrainingImpulse],
        params: &BanisterParams,
        observations: &[PerformanceObservation],
    ) -> f64 {
        let horizon = observations.iter().map(|o| o.time_hours).fold(0.0, f64::max) + 24.0;
        let result = solver.solve(impulses, params, horizon, 1.0).unwrap();
        observations
            .iter()
            .map(|o| (result.performance[o.time_hours.round() as usize] - o.performance).powi(2))
            .sum()
    }

    #[test]
    fn test_forcing_integrates_to_magnitude() {
        let forcing = ImpulseForcing::new(&[TrainingImpulse::new(10.0, 50.0)], 1.0);
        let dt = 0.01;
        let area: f64 = (0..2000).map(|i| forcing.value(i as f64 * dt) * dt).sum();
        assert!((area - 50.0).abs() < 0.01);
        assert_eq!(forcing.value(100.0), 0.0);
    }

    #[test]
    fn test_forcing_superposition() {
        let a = TrainingImpulse::new(0.0, 30.0);
        let b = TrainingImpulse::new(0.5, 20.0);
        let both = ImpulseForcing::new(&[a.clone(), b.clone()], 1.0);
        let sum = ImpulseForcing::new(&[a], 1.0).value(0.2) + ImpulseForcing::new(&[b], 1.0).value(0.2);
        assert!((both.value(0.2) - sum).abs() < 1e-12);
    }

    #[test]
    fn test_empty_solve_is_flat() {
        let solver = FitnessFatigueSolver::new();
        let params = BanisterParams::default();
        let result = solver.solve(&[], &params, 168.0, 1.0).unwrap();

        assert_eq!(result.performance.len(), 169);
        assert!(result.performance.iter().all(|p| *p == params.p0));
        assert!(result.fitness.iter().all(|f| *f == 0.0));
        assert!(result.next_optimal_session_hour.is_none());
    }

    #[test]
    fn test_single_impulse_supercompensation() {
        let solver = FitnessFatigueSolver::new();
        let params = BanisterParams::default();
        let result = solver
            .solve(&[TrainingImpulse::new(0.0, 50.0)], &params, 168.0, 1.0)
            .unwrap();

        // Performance dips under the session, then peaks as fatigue clears
        let min = result.performance.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(min < params.p0);

        let next = result.next_optimal_session_hour.unwrap();
        assert!(next > 38.0 && next < 46.0, "next optimal at {}", next);
        assert_eq!(result.predicted_peak_performance_hour, Some(next));

        let peak_idx = next as usize;
        assert!(result.performance[peak_idx] > 60.0);
    }

    #[test]
    fn test_fatigue_decays_faster_than_fitness() {
        let solver = FitnessFatigueSolver::new();
        let params = BanisterParams {
            tau1: 45.0 * 24.0,
            tau2: 15.0 * 24.0,
            ..BanisterParams::default()
        };
        let result = solver
            .solve(&[TrainingImpulse::new(0.0, 50.0)], &params, 168.0, 1.0)
            .unwrap();

        assert!(result.fitness[0].abs() < 1e-9);
        assert!(result.fatigue[0].abs() < 1e-9);

        // Integration starts one pulse width before the session, so only
        // Phi(1) of the unit-area pulse is absorbed
        let absorbed = 50.0 * Normal::new(0.0, 1.0).unwrap().cdf(1.0);
        let fitness_peak = result.fitness.iter().cloned().fold(0.0, f64::max);
        let fatigue_peak = result.fatigue.iter().cloned().fold(0.0, f64::max);
        assert!((fitness_peak - absorbed).abs() < 0.5, "fitness peak {}", fitness_peak);
        assert!((fatigue_peak - absorbed).abs() < 0.5, "fatigue peak {}", fatigue_peak);
        assert!(fitness_peak >= fatigue_peak);

        let fitness_end = *result.fitness.last().unwrap();
        let fatigue_end = *result.fatigue.last().unwrap();
        assert!(fitness_end < fitness_peak);
        assert!(fatigue_end / fatigue_peak < fitness_end / fitness_peak);
    }

    #[test]
    fn test_params_validation() {
        let solver = FitnessFatigueSolver::new();
        let inverted = BanisterParams {
            tau1: 10.0,
            tau2: 10.0,
            ..BanisterParams::default()
        };
        let result = solver.solve(&[TrainingImpulse::new(0.0, 50.0)], &inverted, 24.0, 1.0);
        assert!(matches!(result, Err(AdaptError::Validation(_))));

        assert!(solver.solve(&[], &BanisterParams::default(), 0.0, 1.0).is_err());
        assert!(solver.solve(&[], &BanisterParams::default(), 24.0, 0.0).is_err());
    }

    #[test]
    fn test_oversized_horizon_is_rejected() {
        let solver = FitnessFatigueSolver::new();
        let impulses = vec![TrainingImpulse::new(0.0, 50.0)];

        let result = solver.solve(&impulses, &BanisterParams::default(), 1e300, 1.0);
        assert!(matches!(result, Err(AdaptError::Validation(_))));
        let result = solver.solve(&[], &BanisterParams::default(), 1e6, 1e-300);
        assert!(matches!(result, Err(AdaptError::Validation(_))));

        let request = SolveRequest {
            impulses: impulses.clone(),
            params: BanisterParams::default(),
            forecast_hours: 1e300,
            optimize_params: false,
            performance_observations: None,
        };
        assert!(matches!(solver.run(&request), Err(AdaptError::Validation(_))));

        let request = MultiSystemRequest {
            impulses,
            forecast_hours: MAX_FORECAST_HOURS + 1.0,
        };
        assert!(matches!(
            solver.run_multi_system(&request),
            Err(AdaptError::Validation(_))
        ));
    }

    #[test]
    fn test_fit_survives_distant_observations() {
        let solver = FitnessFatigueSolver::new();
        let impulses = vec![TrainingImpulse::new(0.0, 50.0)];
        let observations: Vec<PerformanceObservation> = [10.0, 40.0, 1e300]
            .iter()
            .map(|&t| PerformanceObservation { time_hours: t, performance: 50.0 })
            .collect();

        // Every trial fails to simulate and scores the failure objective
        let fitted =
            solver.optimize_params(&impulses, &observations, &BanisterParams::default());
        assert!(fitted.validate().is_ok());
    }

    #[test]
    fn test_projection_keeps_tau_order() {
        let projected = BanisterParams::from_vector_clamped(&[50.0, -1.0, 0.0, 3.0, 40.0]);
        assert_eq!(projected.k1, 0.01);
        assert_eq!(projected.k2, 0.01);
        assert_eq!(projected.tau1, 5.0);
        assert_eq!(projected.tau2, 4.0);
        assert!(projected.validate().is_ok());

        let projected = BanisterParams::from_vector_clamped(&[50.0, 1.0, 2.0, 30.0, 29.9]);
        assert!(projected.tau2 <= projected.tau1 - 1.0);
    }

    #[test]
    fn test_optimize_requires_three_observations() {
        let solver = FitnessFatigueSolver::new();
        let initial = BanisterParams::default();
        let observations = vec![
            PerformanceObservation { time_hours: 10.0, performance: 40.0 },
            PerformanceObservation { time_hours: 40.0, performance: 60.0 },
        ];
        let fitted =
            solver.optimize_params(&[TrainingImpulse::new(0.0, 50.0)], &observations, &initial);
        assert_eq!(fitted, initial);
    }

    #[test]
    fn test_optimize_improves_fit() {
        let solver = FitnessFatigueSolver::new();
        let impulses = vec![
            TrainingImpulse::new(0.0, 40.0),
            TrainingImpulse::new(48.0, 40.0),
        ];
        let truth = BanisterParams {
            p0: 55.0,
            k1: 1.2,
            k2: 2.5,
            tau1: 60.0,
            tau2: 12.0,
        };
        let reference = solver.solve(&impulses, &truth, 120.0, 1.0).unwrap();
        let observations: Vec<PerformanceObservation> = [6usize, 20, 36, 60, 80, 100]
            .iter()
            .map(|&i| PerformanceObservation {
                time_hours: i as f64,
                performance: reference.performance[i],
            })
            .collect();

        let initial = BanisterParams {
            tau1: 30.0,
            tau2: 28.0,
            ..BanisterParams::default()
        };
        let fitted = solver.optimize_params(&impulses, &observations, &initial);

        assert!(fitted.tau2 <= fitted.tau1 - 1.0);
        assert!(fitted.k1 >= 0.01 && fitted.k2 >= 0.01);
        assert!(
            sse(&solver, &impulses, &fitted, &observations)
                < sse(&solver, &impulses, &initial, &observations)
        );
    }

    #[test]
    fn test_run_echoes_fitted_params() {
        let solver = FitnessFatigueSolver::new();
        let request = SolveRequest {
            impulses: vec![TrainingImpulse::new(0.0, 50.0)],
            params: BanisterParams::default(),
            forecast_hours: 72.0,
            optimize_params: true,
            performance_observations: Some(vec![
                PerformanceObservation { time_hours: 5.0, performance: 20.0 },
            ]),
        };

        let response = solver.run(&request).unwrap();
        assert_eq!(response.optimal_params, Some(BanisterParams::default()));
        assert_eq!(response.performance.len(), 73);
    }

    #[test]
    fn test_system_magnitudes() {
        let plain = TrainingImpulse::new(0.0, 100.0);
        assert_eq!(BodySystem::Muscular.magnitude(&plain), 100.0);
        assert_eq!(BodySystem::Neural.magnitude(&plain), 80.0);
        assert_eq!(BodySystem::Connective.magnitude(&plain), 60.0);

        let measured = TrainingImpulse {
            neural_impulse: Some(30.0),
            connective_impulse: Some(0.0),
            ..plain
        };
        assert_eq!(BodySystem::Neural.magnitude(&measured), 30.0);
        assert_eq!(BodySystem::Connective.magnitude(&measured), 60.0);

        let total: f64 = BodySystem::ALL.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_multi_system_combination() {
        let solver = FitnessFatigueSolver::new();
        let impulses = vec![
            TrainingImpulse::new(0.0, 60.0),
            TrainingImpulse::new(48.0, 60.0),
        ];
        let result = solver.solve_multi_system(&impulses, 168.0).unwrap();

        assert_eq!(result.systems.len(), 3);
        let muscular = result.system(BodySystem::Muscular).unwrap();
        let neural = result.system(BodySystem::Neural).unwrap();
        let connective = result.system(BodySystem::Connective).unwrap();
        assert_eq!(muscular.timeline_hours.len(), 29);
        assert_eq!(muscular.timeline_hours[1], 6.0);

        for i in 0..result.combined_performance.len() {
            let expected = 0.4 * muscular.performance[i]
                + 0.35 * neural.performance[i]
                + 0.25 * connective.performance[i];
            assert!((result.combined_performance[i] - expected).abs() < 1e-9);
        }
        assert_eq!(result.verdict_text, result.verdict.description());
    }

    #[test]
    fn test_multi_system_without_sessions() {
        let solver = FitnessFatigueSolver::new();
        let result = solver.solve_multi_system(&[], 72.0).unwrap();
        assert!(result.combined_performance.iter().all(|p| (p - 100.0).abs() < 1e-12));
        assert!(result.optimal_next_session_hour.is_none());
        assert_eq!(result.verdict, TrainingVerdict::Stable);
    }

    #[test]
    fn test_verdict_rules() {
        assert_eq!(
            TrainingVerdict::from_combined(&[106.0, 108.0]),
            TrainingVerdict::SupercompensationWindow
        );
        assert_eq!(TrainingVerdict::from_combined(&[85.0, 95.0]), TrainingVerdict::DeloadNeeded);
        assert_eq!(TrainingVerdict::from_combined(&[100.0, 92.0]), TrainingVerdict::ReduceVolume);
        assert_eq!(TrainingVerdict::from_combined(&[100.0, 101.0]), TrainingVerdict::Stable);
        assert_eq!(TrainingVerdict::from_combined(&[]), TrainingVerdict::InsufficientData);
    }

    #[test]
    fn test_argmax_first_occurrence() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
