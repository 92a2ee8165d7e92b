//! Gaussian-process regression
//!
//! Kernel `C · Matérn(ν=5/2, ℓ) + White(noise)` over standardized features,
//! targets normalized to zero mean and unit variance. Hyperparameters are
//! chosen by maximizing the log marginal likelihood in log space, starting
//! from the configured initial point plus seeded random restarts.

use crate::error::CalculationError;
use crate::optimize::{Minimizer, NelderMead, NelderMeadConfig, OptimizationResult};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Factorization attempts at the selected hyperparameters, each with ten
/// times the previous diagonal jitter
const JITTER_ATTEMPTS: i32 = 4;

/// Capability interface for a probabilistic regressor
pub trait Regressor {
    /// Predictive mean and standard deviation for each row of `x`
    fn predict(&self, x: &[Vec<f64>]) -> Result<GpPrediction, CalculationError>;
}

/// Predictive distribution at a set of query points
#[derive(Debug, Clone, PartialEq)]
pub struct GpPrediction {
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

/// Feature standardization with population statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Learn per-column mean and standard deviation; constant columns get scale 1
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let means: Vec<f64> = (0..dims)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let scales = (0..dims)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        StandardScaler { means, scales }
    }

    /// Pass-through scaler for models trained on raw features
    pub fn identity(dims: usize) -> Self {
        StandardScaler {
            means: vec![0.0; dims],
            scales: vec![1.0; dims],
        }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

/// Kernel hyperparameters in natural units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    /// Signal variance C
    pub amplitude: f64,

    /// Isotropic Matérn length scale ℓ
    pub length_scale: f64,

    /// White-noise variance
    pub noise: f64,
}

impl KernelParams {
    fn to_log(self) -> [f64; 3] {
        [self.amplitude.ln(), self.length_scale.ln(), self.noise.ln()]
    }

    fn from_log(theta: &[f64], bounds: &KernelBounds) -> Self {
        KernelParams {
            amplitude: theta[0].exp().clamp(bounds.amplitude.0, bounds.amplitude.1),
            length_scale: theta[1].exp().clamp(bounds.length_scale.0, bounds.length_scale.1),
            noise: theta[2].exp().clamp(bounds.noise.0, bounds.noise.1),
        }
    }

    /// Covariance between two standardized points, without white noise
    fn covariance(&self, a: &[f64], b: &[f64]) -> f64 {
        let distance = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt();
        let d = 5.0_f64.sqrt() * distance / self.length_scale;
        self.amplitude * (1.0 + d + d * d / 3.0) * (-d).exp()
    }
}

/// Box bounds on the hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelBounds {
    pub amplitude: (f64, f64),
    pub length_scale: (f64, f64),
    pub noise: (f64, f64),
}

impl Default for KernelBounds {
    fn default() -> Self {
        KernelBounds {
            amplitude: (1e-3, 1e3),
            length_scale: (1e-2, 1e2),
            noise: (1e-4, 1.0),
        }
    }
}

impl KernelBounds {
    fn log_ranges(&self) -> [(f64, f64); 3] {
        [
            (self.amplitude.0.ln(), self.amplitude.1.ln()),
            (self.length_scale.0.ln(), self.length_scale.1.ln()),
            (self.noise.0.ln(), self.noise.1.ln()),
        ]
    }
}

/// Gaussian-process fit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpConfig {
    pub initial: KernelParams,
    pub bounds: KernelBounds,

    /// Jitter added to the covariance diagonal
    pub diagonal_jitter: f64,

    /// Random restarts of the hyperparameter search on top of the initial point
    pub restarts: usize,

    pub seed: u64,
    pub normalize_targets: bool,
    pub optimizer: NelderMeadConfig,
}

impl Default for GpConfig {
    fn default() -> Self {
        GpConfig {
            initial: KernelParams {
                amplitude: 1.0,
                length_scale: 1.0,
                noise: 0.05,
            },
            bounds: KernelBounds::default(),
            diagonal_jitter: 1e-6,
            restarts: 5,
            seed: 42,
            normalize_targets: true,
            optimizer: NelderMeadConfig {
                max_iterations: 300,
                max_evaluations: 1_000,
                xatol: 1e-3,
                fatol: 1e-4,
            },
        }
    }
}

/// Fitted Gaussian-process regressor
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    params: KernelParams,
    train_x: Vec<Vec<f64>>,
    /// Lower Cholesky factor of the training covariance
    chol_l: DMatrix<f64>,
    /// `K⁻¹ y` for the normalized targets
    weights: DVector<f64>,
    y_mean: f64,
    y_std: f64,
    log_marginal_likelihood: f64,
}

/// Cholesky factor, `K⁻¹ y` and log marginal likelihood for one hyperparameter set
struct Factorized {
    chol_l: DMatrix<f64>,
    weights: DVector<f64>,
    lml: f64,
}

fn factorize(
    params: &KernelParams,
    x: &[Vec<f64>],
    y: &DVector<f64>,
    jitter: f64,
) -> Option<Factorized> {
    let n = x.len();
    let k = DMatrix::from_fn(n, n, |i, j| {
        let base = params.covariance(&x[i], &x[j]);
        if i == j {
            base + params.noise + jitter
        } else {
            base
        }
    });

    let chol = k.cholesky()?;
    let weights = chol.solve(y);
    let chol_l = chol.l();
    let log_det_half: f64 = chol_l.diagonal().iter().map(|d| d.ln()).sum();
    let lml = -0.5 * y.dot(&weights) - log_det_half - 0.5 * n as f64 * (2.0 * PI).ln();

    lml.is_finite().then_some(Factorized {
        chol_l,
        weights,
        lml,
    })
}

impl GaussianProcess {
    /// Fit hyperparameters and condition on the training data
    pub fn fit(config: &GpConfig, x: &[Vec<f64>], y: &[f64]) -> Result<Self, CalculationError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(CalculationError::InsufficientData {
                calculation: "Gaussian process fit".to_string(),
                reason: format!("{} feature rows for {} targets", x.len(), y.len()),
            });
        }

        let n = y.len() as f64;
        let (y_mean, y_std) = if config.normalize_targets {
            let mean = y.iter().sum::<f64>() / n;
            let std = (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        } else {
            (0.0, 1.0)
        };
        let targets = DVector::from_iterator(y.len(), y.iter().map(|v| (v - y_mean) / y_std));

        let bounds = config.bounds;
        let negative_lml = |theta: &[f64]| -> f64 {
            let params = KernelParams::from_log(theta, &bounds);
            factorize(&params, x, &targets, config.diagonal_jitter)
                .map_or(f64::INFINITY, |f| -f.lml)
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let ranges = bounds.log_ranges();
        let mut starts = vec![config.initial.to_log().to_vec()];
        for _ in 0..config.restarts {
            starts.push(ranges.iter().map(|(lo, hi)| rng.gen_range(*lo..*hi)).collect());
        }

        let optimizer = NelderMead::with_config(config.optimizer.clone());
        let best = starts
            .par_iter()
            .map(|start| optimizer.minimize(negative_lml, start))
            .collect::<Vec<_>>()
            .into_iter()
            .fold(None, |best: Option<OptimizationResult>, candidate| {
                match best {
                    Some(b) if b.value <= candidate.value => Some(b),
                    _ => Some(candidate),
                }
            });

        let params = best
            .filter(|b| b.value.is_finite())
            .map(|b| KernelParams::from_log(&b.x, &bounds))
            .ok_or_else(|| CalculationError::Factorization {
                reason: "covariance is not positive definite for any hyperparameter start"
                    .to_string(),
            })?;

        let fitted = (0..JITTER_ATTEMPTS)
            .find_map(|attempt| {
                let jitter = config.diagonal_jitter * 10f64.powi(attempt);
                if attempt > 0 {
                    warn!(jitter, "Covariance not positive definite, retrying with more jitter");
                }
                factorize(&params, x, &targets, jitter)
            })
            .ok_or_else(|| CalculationError::Factorization {
                reason: "covariance is not positive definite at the selected hyperparameters"
                    .to_string(),
            })?;

        debug!(
            samples = x.len(),
            amplitude = params.amplitude,
            length_scale = params.length_scale,
            noise = params.noise,
            log_marginal_likelihood = fitted.lml,
            "Gaussian process fitted"
        );

        Ok(GaussianProcess {
            params,
            train_x: x.to_vec(),
            chol_l: fitted.chol_l,
            weights: fitted.weights,
            y_mean,
            y_std,
            log_marginal_likelihood: fitted.lml,
        })
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    pub fn training_size(&self) -> usize {
        self.train_x.len()
    }
}

impl Regressor for GaussianProcess {
    fn predict(&self, x: &[Vec<f64>]) -> Result<GpPrediction, CalculationError> {
        let n = self.train_x.len();
        let mut mean = Vec::with_capacity(x.len());
        let mut std_dev = Vec::with_capacity(x.len());

        for query in x {
            let k_star = DVector::from_iterator(
                n,
                self.train_x.iter().map(|t| self.params.covariance(t, query)),
            );
            let v = self.chol_l.solve_lower_triangular(&k_star).ok_or_else(|| {
                CalculationError::Factorization {
                    reason: "singular Cholesky factor".to_string(),
                }
            })?;

            let prior_var = self.params.amplitude + self.params.noise;
            let variance = (prior_var - v.dot(&v)).max(0.0);

            mean.push(k_star.dot(&self.weights) * self.y_std + self.y_mean);
            std_dev.push(variance.sqrt() * self.y_std);
        }

        Ok(GpPrediction { mean, std_dev })
    }
}
