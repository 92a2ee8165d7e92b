//! Bayesian per-muscle recovery estimation
//!
//! Each muscle's recovery time τ (hours to ~90% recovery) is modelled with a
//! Gamma(α, β) belief whose point estimate is the posterior mean β/α.
//!
//! # Conjugate updating
//!
//! A recovery observation compares the battery level the athlete actually
//! reported against the session stress and elapsed time. Inverting the
//! exponential battery model gives an implied recovery time τ̂, and the
//! belief is updated in O(1):
//!
//! ```text
//! α ← α + 1
//! β ← β + τ̂
//! ```
//!
//! Beliefs start from a population table (24 h for small fast-recovering
//! muscles up to 96 h for the posterior chain) and converge towards the
//! individual's own recovery dynamics as observations accumulate.
//!
//! # Credible intervals
//!
//! The interval is read from a Gamma distribution with shape α and rate
//! α²/β, i.e. mean β/α and variance (β/α)²/α, so it stays centred on the
//! point estimate and narrows as α grows.
//!
//! All operations are pure: priors are taken by reference and updated
//! copies are returned.

use crate::error::{AdaptError, Result};
use crate::precision::round_to;
use crate::validation::{require_finite, require_non_empty, Validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Gamma};
use std::collections::BTreeMap;
use tracing::debug;

/// Ratio mapping an exponential decay constant to the "recovered" threshold
/// of the battery model (≈ ln 20). Kept as the literal for prediction
/// compatibility.
pub const RECOVERY_TIME_CONSTANT: f64 = 2.9957;

/// Population recovery hours by muscle group (lower-cased keys)
const POPULATION_RECOVERY_HOURS: &[(&str, f64)] = &[
    ("bíceps", 24.0),
    ("tríceps", 24.0),
    ("deltoides", 24.0),
    ("pantorrillas", 24.0),
    ("abdomen", 24.0),
    ("antebrazo", 24.0),
    ("pectorales", 48.0),
    ("dorsales", 48.0),
    ("hombros", 48.0),
    ("trapecio", 48.0),
    ("aductores", 48.0),
    ("core", 48.0),
    ("cuádriceps", 72.0),
    ("glúteos", 72.0),
    ("isquiosurales", 96.0),
    ("espalda baja", 96.0),
    ("erectores espinales", 96.0),
    // English aliases
    ("biceps", 24.0),
    ("triceps", 24.0),
    ("deltoids", 24.0),
    ("calves", 24.0),
    ("abs", 24.0),
    ("forearms", 24.0),
    ("chest", 48.0),
    ("lats", 48.0),
    ("shoulders", 48.0),
    ("traps", 48.0),
    ("adductors", 48.0),
    ("quadriceps", 72.0),
    ("glutes", 72.0),
    ("hamstrings", 96.0),
    ("lower back", 96.0),
    ("spinal erectors", 96.0),
];

/// Population default recovery time for a muscle, if it is tabulated
pub fn population_recovery_hours(muscle: &str) -> Option<f64> {
    let key = normalize_muscle(muscle);
    POPULATION_RECOVERY_HOURS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, hours)| *hours)
}

/// Normalize a muscle identifier to its map key
pub fn normalize_muscle(muscle: &str) -> String {
    muscle.trim().to_lowercase()
}

/// Recovery estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Probability mass of the reported credible interval (default: 0.90)
    pub credible_mass: f64,

    /// Lower plausibility bound for an implied recovery time in hours
    pub min_implied_hours: f64,

    /// Upper plausibility bound for an implied recovery time in hours
    pub max_implied_hours: f64,

    /// Shape of a freshly seeded population prior
    pub default_alpha: f64,

    /// Recovery hours for muscles missing from the population table
    pub fallback_hours: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            credible_mass: 0.90,
            min_implied_hours: 6.0,
            max_implied_hours: 200.0,
            default_alpha: 2.0,
            fallback_hours: 48.0,
        }
    }
}

/// Gamma belief over one muscle's recovery time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaPrior {
    /// Shape; grows by one per accepted observation
    pub alpha: f64,

    /// Accumulated recovery hours
    pub beta: f64,
}

impl Default for GammaPrior {
    fn default() -> Self {
        GammaPrior {
            alpha: 2.0,
            beta: 96.0,
        }
    }
}

impl GammaPrior {
    /// Prior centred on `hours` with the given shape
    pub fn centred_on(hours: f64, alpha: f64) -> Self {
        GammaPrior {
            alpha,
            beta: alpha * hours,
        }
    }

    /// Posterior mean recovery time in hours
    pub fn expected_hours(&self) -> f64 {
        if self.alpha > 0.0 {
            self.beta / self.alpha
        } else {
            0.0
        }
    }

    /// Posterior variance of the recovery time
    pub fn variance(&self) -> f64 {
        if self.alpha > 0.0 {
            self.expected_hours().powi(2) / self.alpha
        } else {
            0.0
        }
    }

    /// Conjugate update with one implied recovery time
    pub fn observe(&self, implied_hours: f64) -> Self {
        GammaPrior {
            alpha: self.alpha + 1.0,
            beta: self.beta + implied_hours,
        }
    }

    /// Central credible interval holding `mass` of the posterior
    pub fn credible_interval(&self, mass: f64) -> CredibleInterval {
        let mean = self.expected_hours();
        let tail = ((1.0 - mass) / 2.0).clamp(0.0, 0.5);

        match Gamma::new(self.alpha, self.alpha / mean.max(f64::MIN_POSITIVE)) {
            Ok(dist) => CredibleInterval {
                lower: dist.inverse_cdf(tail),
                upper: dist.inverse_cdf(1.0 - tail),
            },
            Err(_) => CredibleInterval {
                lower: mean,
                upper: mean,
            },
        }
    }
}

/// Central credible interval (5th / 95th percentile for the default mass)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredibleInterval {
    pub lower: f64,
    pub upper: f64,
}

impl CredibleInterval {
    /// Interval width in hours
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Per-user recovery beliefs, owned and persisted by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecoveryPriors {
    /// Muscle (lower-cased) to Gamma belief
    #[serde(default)]
    pub muscle_priors: BTreeMap<String, GammaPrior>,

    /// Accepted observations across all muscles
    #[serde(default)]
    pub total_observations: u32,

    /// When an observation was last accepted
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserRecoveryPriors {
    /// Belief for a muscle, if one has been recorded
    pub fn get(&self, muscle: &str) -> Option<&GammaPrior> {
        self.muscle_priors.get(&normalize_muscle(muscle))
    }

    /// Whether the muscle has a recorded belief
    pub fn is_personalized(&self, muscle: &str) -> bool {
        self.get(muscle).is_some()
    }
}

/// Nutrition status of the athlete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutritionStatus {
    Deficit,
    #[default]
    Maintenance,
    Surplus,
}

impl NutritionStatus {
    /// Numeric encoding used as a regression feature
    pub fn as_feature(&self) -> f64 {
        match self {
            NutritionStatus::Deficit => -1.0,
            NutritionStatus::Maintenance => 0.0,
            NutritionStatus::Surplus => 1.0,
        }
    }

    /// Recovery-time multiplier
    pub fn recovery_multiplier(&self) -> f64 {
        match self {
            NutritionStatus::Deficit => 1.35,
            NutritionStatus::Maintenance => 1.0,
            NutritionStatus::Surplus => 0.85,
        }
    }
}

/// Lifestyle context modulating a learned recovery time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryContext {
    pub nutrition_status: NutritionStatus,

    /// Subjective stress on a 1-5 scale
    pub stress_level: f64,

    /// Hours slept the previous night
    pub sleep_hours: f64,

    /// Age in years
    pub age: f64,
}

impl Default for RecoveryContext {
    fn default() -> Self {
        RecoveryContext {
            nutrition_status: NutritionStatus::Maintenance,
            stress_level: 3.0,
            sleep_hours: 7.5,
            age: 25.0,
        }
    }
}

impl RecoveryContext {
    /// Composite multiplier applied to the base recovery time, floored at 0.5
    pub fn multiplier(&self) -> f64 {
        let mut mult = self.nutrition_status.recovery_multiplier();

        if self.stress_level >= 4.0 {
            mult *= 1.4;
        }

        mult *= if self.sleep_hours < 6.0 {
            1.5
        } else if self.sleep_hours < 7.0 {
            1.2
        } else if self.sleep_hours >= 8.5 {
            0.8
        } else if self.sleep_hours >= 7.5 {
            0.9
        } else {
            1.0
        };

        if self.age > 35.0 {
            mult *= 1.0 + (self.age - 35.0) * 0.01;
        }

        mult.max(0.5)
    }
}

/// One predicted-vs-actual recovery data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryObservation {
    pub muscle: String,
    pub session_stress: f64,
    pub hours_since_session: f64,
    pub predicted_battery: f64,
    pub actual_battery: f64,
    #[serde(default)]
    pub sleep_quality: Option<f64>,
    #[serde(default)]
    pub nutrition_status: Option<NutritionStatus>,
    #[serde(default)]
    pub stress_level: Option<f64>,
}

impl RecoveryObservation {
    /// Observation without optional context
    pub fn new(
        muscle: impl Into<String>,
        session_stress: f64,
        hours_since_session: f64,
        predicted_battery: f64,
        actual_battery: f64,
    ) -> Self {
        RecoveryObservation {
            muscle: muscle.into(),
            session_stress,
            hours_since_session,
            predicted_battery,
            actual_battery,
            sleep_quality: None,
            nutrition_status: None,
            stress_level: None,
        }
    }
}

/// Confidence tier derived from the number of accepted observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    PopulationDefault,
}

impl ConfidenceTier {
    pub fn from_observations(total: u32) -> Self {
        match total {
            n if n >= 20 => ConfidenceTier::High,
            n if n >= 10 => ConfidenceTier::Medium,
            n if n >= 3 => ConfidenceTier::Low,
            _ => ConfidenceTier::PopulationDefault,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::PopulationDefault => "population-default",
        }
    }
}

/// Result of a recovery belief update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryUpdate {
    pub updated_priors: UserRecoveryPriors,

    /// Posterior mean per muscle
    #[serde(rename = "personalized_recovery_hours")]
    pub personalized_hours: BTreeMap<String, f64>,

    /// Credible interval per muscle
    pub confidence_intervals: BTreeMap<String, CredibleInterval>,

    /// Change of the posterior mean for muscles touched by this update
    #[serde(rename = "improvement_delta")]
    pub delta: BTreeMap<String, f64>,

    pub accepted_observations: usize,
    pub skipped_observations: usize,
}

impl RecoveryUpdate {
    /// Copy rounded for presentation (1 decimal hours, 2 decimal deltas)
    pub fn rounded(&self) -> Self {
        RecoveryUpdate {
            updated_priors: self.updated_priors.clone(),
            personalized_hours: self
                .personalized_hours
                .iter()
                .map(|(k, v)| (k.clone(), round_to(*v, 1)))
                .collect(),
            confidence_intervals: self
                .confidence_intervals
                .iter()
                .map(|(k, ci)| {
                    (
                        k.clone(),
                        CredibleInterval {
                            lower: round_to(ci.lower, 1),
                            upper: round_to(ci.upper, 1),
                        },
                    )
                })
                .collect(),
            delta: self
                .delta
                .iter()
                .map(|(k, v)| (k.clone(), round_to(*v, 2)))
                .collect(),
            accepted_observations: self.accepted_observations,
            skipped_observations: self.skipped_observations,
        }
    }
}

/// Personalized recovery estimate for one muscle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEstimate {
    pub muscle: String,
    pub estimated_recovery_hours: f64,
    pub is_personalized: bool,
    pub confidence: ConfidenceTier,
}

impl RecoveryEstimate {
    pub fn rounded(&self) -> Self {
        RecoveryEstimate {
            estimated_recovery_hours: round_to(self.estimated_recovery_hours, 1),
            ..self.clone()
        }
    }
}

/// Request payload for a belief update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryUpdateRequest {
    pub observations: Vec<RecoveryObservation>,
    #[serde(default)]
    pub current_priors: UserRecoveryPriors,
}

impl Validate for RecoveryUpdateRequest {
    fn validate(&self) -> Result<()> {
        for (i, obs) in self.observations.iter().enumerate() {
            require_non_empty(&format!("observations[{}].muscle", i), &obs.muscle)?;
            require_finite(&format!("observations[{}].session_stress", i), obs.session_stress)?;
            require_finite(
                &format!("observations[{}].hours_since_session", i),
                obs.hours_since_session,
            )?;
            require_finite(
                &format!("observations[{}].predicted_battery", i),
                obs.predicted_battery,
            )?;
            require_finite(&format!("observations[{}].actual_battery", i), obs.actual_battery)?;
        }
        validate_priors(&self.current_priors)
    }
}

/// Request payload for a single-muscle estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryEstimateRequest {
    pub muscle: String,
    #[serde(default)]
    pub priors: UserRecoveryPriors,
    #[serde(default)]
    pub context: Option<RecoveryContext>,
}

impl Validate for RecoveryEstimateRequest {
    fn validate(&self) -> Result<()> {
        require_non_empty("muscle", &self.muscle)?;
        if let Some(ctx) = &self.context {
            require_finite("context.stress_level", ctx.stress_level)?;
            require_finite("context.sleep_hours", ctx.sleep_hours)?;
            require_finite("context.age", ctx.age)?;
        }
        validate_priors(&self.priors)
    }
}

fn validate_priors(priors: &UserRecoveryPriors) -> Result<()> {
    for (muscle, prior) in &priors.muscle_priors {
        if !(prior.alpha.is_finite() && prior.alpha > 0.0) {
            return Err(AdaptError::validation(format!(
                "prior for {} needs alpha > 0, got {}",
                muscle, prior.alpha
            )));
        }
        if !(prior.beta.is_finite() && prior.beta > 0.0) {
            return Err(AdaptError::validation(format!(
                "prior for {} needs beta > 0, got {}",
                muscle, prior.beta
            )));
        }
    }
    Ok(())
}

/// Bayesian recovery-rate estimator
#[derive(Debug, Clone)]
pub struct RecoveryEstimator {
    config: RecoveryConfig,
}

impl RecoveryEstimator {
    /// Create new estimator with default configuration
    pub fn new() -> Self {
        RecoveryEstimator {
            config: RecoveryConfig::default(),
        }
    }

    /// Create new estimator with custom configuration
    pub fn with_config(config: RecoveryConfig) -> Self {
        RecoveryEstimator { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Population prior for a muscle, falling back for unknown names
    pub fn default_prior(&self, muscle: &str) -> GammaPrior {
        let hours = population_recovery_hours(muscle).unwrap_or(self.config.fallback_hours);
        GammaPrior::centred_on(hours, self.config.default_alpha)
    }

    /// Recovery time implied by an observation, or `None` if it is unusable
    ///
    /// Solves the exponential battery model for its decay constant
    /// `k = -ln(remaining) / hours` with the remaining fraction clamped to
    /// [0.01, 0.99], then `τ̂ = 2.9957 / k` clamped to the plausibility bounds.
    pub fn implied_recovery_hours(&self, obs: &RecoveryObservation) -> Option<f64> {
        if !(obs.hours_since_session > 0.0) || !(obs.session_stress > 0.0) {
            return None;
        }

        let actual_depletion = (100.0 - obs.actual_battery).max(1.0);
        let initial_depletion = actual_depletion.max(obs.session_stress);

        let remaining = (actual_depletion / initial_depletion).clamp(0.01, 0.99);
        let k = -remaining.ln() / obs.hours_since_session;

        if !(k > 0.0) || !k.is_finite() {
            return None;
        }

        let implied = RECOVERY_TIME_CONSTANT / k;
        Some(implied.clamp(self.config.min_implied_hours, self.config.max_implied_hours))
    }

    /// Fold observations into the current beliefs, returning updated copies
    pub fn update(
        &self,
        observations: &[RecoveryObservation],
        current_priors: &UserRecoveryPriors,
    ) -> RecoveryUpdate {
        self.update_at(observations, current_priors, Utc::now())
    }

    /// Same as [`update`](Self::update) with an explicit timestamp
    pub fn update_at(
        &self,
        observations: &[RecoveryObservation],
        current_priors: &UserRecoveryPriors,
        now: DateTime<Utc>,
    ) -> RecoveryUpdate {
        let mut priors = current_priors.clone();
        let mut starting_means: BTreeMap<String, f64> = BTreeMap::new();
        let mut accepted = 0usize;
        let mut skipped = 0usize;

        for obs in observations {
            let muscle = normalize_muscle(&obs.muscle);
            let prior = *priors
                .muscle_priors
                .entry(muscle.clone())
                .or_insert_with(|| self.default_prior(&muscle));
            starting_means
                .entry(muscle.clone())
                .or_insert_with(|| prior.expected_hours());

            match self.implied_recovery_hours(obs) {
                Some(implied) => {
                    priors.muscle_priors.insert(muscle, prior.observe(implied));
                    priors.total_observations += 1;
                    accepted += 1;
                }
                None => {
                    debug!(muscle = %muscle, "Skipping unusable recovery observation");
                    skipped += 1;
                }
            }
        }

        if accepted > 0 {
            priors.last_updated = Some(now);
        }

        let personalized_hours = priors
            .muscle_priors
            .iter()
            .map(|(m, p)| (m.clone(), p.expected_hours()))
            .collect();
        let confidence_intervals = priors
            .muscle_priors
            .iter()
            .map(|(m, p)| (m.clone(), p.credible_interval(self.config.credible_mass)))
            .collect();
        let delta = starting_means
            .iter()
            .map(|(m, before)| {
                let after = priors.muscle_priors[m].expected_hours();
                (m.clone(), after - before)
            })
            .collect();

        debug!(
            accepted,
            skipped,
            total = priors.total_observations,
            "Recovery priors updated"
        );

        RecoveryUpdate {
            updated_priors: priors,
            personalized_hours,
            confidence_intervals,
            delta,
            accepted_observations: accepted,
            skipped_observations: skipped,
        }
    }

    /// Best current recovery-time estimate for a muscle in hours
    pub fn estimate_hours(
        &self,
        muscle: &str,
        priors: &UserRecoveryPriors,
        context: Option<&RecoveryContext>,
    ) -> f64 {
        let base = priors
            .get(muscle)
            .copied()
            .unwrap_or_else(|| self.default_prior(muscle))
            .expected_hours();

        match context {
            Some(ctx) => base * ctx.multiplier(),
            None => base,
        }
    }

    /// Estimate with personalization flag and confidence tier
    pub fn estimate(
        &self,
        muscle: &str,
        priors: &UserRecoveryPriors,
        context: Option<&RecoveryContext>,
    ) -> RecoveryEstimate {
        RecoveryEstimate {
            muscle: muscle.to_string(),
            estimated_recovery_hours: self.estimate_hours(muscle, priors, context),
            is_personalized: priors.is_personalized(muscle),
            confidence: ConfidenceTier::from_observations(priors.total_observations),
        }
    }

    /// Handle a validated update request
    pub fn run_update(&self, request: &RecoveryUpdateRequest) -> Result<RecoveryUpdate> {
        request.validate()?;
        Ok(self.update(&request.observations, &request.current_priors))
    }

    /// Handle a validated estimate request
    pub fn run_estimate(&self, request: &RecoveryEstimateRequest) -> Result<RecoveryEstimate> {
        request.validate()?;
        Ok(self.estimate(&request.muscle, &request.priors, request.context.as_ref()))
    }
}

impl Default for RecoveryEstimator {
    fn default() -> Self {
        Self::new()
    }
}
