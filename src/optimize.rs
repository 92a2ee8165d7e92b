//! Derivative-free minimization
//!
//! The Nelder-Mead simplex method is used both for fitting fitness-fatigue
//! parameters against observed performance and for the Gaussian-process
//! hyperparameter search. Neither objective has a cheap gradient, and both
//! enforce their box constraints by clamping inside the objective.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Capability interface for a derivative-free minimizer
pub trait Minimizer {
    /// Minimize `objective` starting from `initial`
    fn minimize<F>(&self, objective: F, initial: &[f64]) -> OptimizationResult
    where
        F: FnMut(&[f64]) -> f64;
}

/// Nelder-Mead configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Maximum simplex iterations
    pub max_iterations: usize,

    /// Hard ceiling on objective evaluations
    pub max_evaluations: usize,

    /// Absolute tolerance on simplex vertex spread
    pub xatol: f64,

    /// Absolute tolerance on objective spread across vertices
    pub fatol: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        NelderMeadConfig {
            max_iterations: 500,
            max_evaluations: 2_000,
            xatol: 0.1,
            fatol: 0.5,
        }
    }
}

/// Outcome of a minimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best point found
    pub x: Vec<f64>,

    /// Objective value at `x`
    pub value: f64,

    pub iterations: usize,
    pub evaluations: usize,

    /// Whether both tolerances were met before a ceiling was hit
    pub converged: bool,
}

/// Nelder-Mead simplex minimizer
#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    config: NelderMeadConfig,
}

// Standard reflection, expansion, contraction and shrink coefficients
const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

impl NelderMead {
    pub fn new() -> Self {
        NelderMead {
            config: NelderMeadConfig::default(),
        }
    }

    pub fn with_config(config: NelderMeadConfig) -> Self {
        NelderMead { config }
    }

    pub fn config(&self) -> &NelderMeadConfig {
        &self.config
    }

    /// Initial simplex: the start point plus one vertex per dimension,
    /// nudged by 5% (or 0.00025 for zero coordinates)
    fn initial_simplex(initial: &[f64]) -> Vec<Vec<f64>> {
        let mut simplex = Vec::with_capacity(initial.len() + 1);
        simplex.push(initial.to_vec());
        for k in 0..initial.len() {
            let mut vertex = initial.to_vec();
            vertex[k] = if vertex[k] != 0.0 {
                vertex[k] * 1.05
            } else {
                0.000_25
            };
            simplex.push(vertex);
        }
        simplex
    }

    fn has_converged(&self, simplex: &[Vec<f64>], values: &[f64]) -> bool {
        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(best).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        x_spread <= self.config.xatol && f_spread <= self.config.fatol
    }
}

/// Treat NaN objective values as infinitely bad
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

/// `(1 + a) * centroid - a * worst`, the affine step used by every move
fn affine(centroid: &[f64], worst: &[f64], a: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(worst)
        .map(|(c, w)| (1.0 + a) * c - a * w)
        .collect()
}

impl Minimizer for NelderMead {
    fn minimize<F>(&self, mut objective: F, initial: &[f64]) -> OptimizationResult
    where
        F: FnMut(&[f64]) -> f64,
    {
        let n = initial.len();
        let mut evaluations = 0usize;
        let mut eval = |x: &[f64], evaluations: &mut usize| {
            *evaluations += 1;
            sanitize(objective(x))
        };

        if n == 0 {
            let value = eval(initial, &mut evaluations);
            return OptimizationResult {
                x: Vec::new(),
                value,
                iterations: 0,
                evaluations,
                converged: true,
            };
        }

        let mut simplex = Self::initial_simplex(initial);
        let mut values: Vec<f64> = simplex
            .iter()
            .map(|v| eval(v, &mut evaluations))
            .collect();

        let sort = |simplex: &mut Vec<Vec<f64>>, values: &mut Vec<f64>| {
            let mut order: Vec<usize> = (0..simplex.len()).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            *values = order.iter().map(|&i| values[i]).collect();
        };
        sort(&mut simplex, &mut values);

        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < self.config.max_iterations
            && evaluations < self.config.max_evaluations
        {
            if self.has_converged(&simplex, &values) {
                converged = true;
                break;
            }

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
                .collect();
            let worst = simplex[n].clone();

            let reflected = affine(&centroid, &worst, RHO);
            let f_reflected = eval(&reflected, &mut evaluations);
            let mut shrink = false;

            if f_reflected < values[0] {
                let expanded = affine(&centroid, &worst, RHO * CHI);
                let f_expanded = eval(&expanded, &mut evaluations);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
            } else if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
            } else if f_reflected < values[n] {
                let contracted = affine(&centroid, &worst, PSI * RHO);
                let f_contracted = eval(&contracted, &mut evaluations);
                if f_contracted <= f_reflected {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    shrink = true;
                }
            } else {
                let contracted = affine(&centroid, &worst, -PSI);
                let f_contracted = eval(&contracted, &mut evaluations);
                if f_contracted < values[n] {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].clone();
                for j in 1..=n {
                    let vertex: Vec<f64> = best
                        .iter()
                        .zip(&simplex[j])
                        .map(|(b, v)| b + SIGMA * (v - b))
                        .collect();
                    values[j] = eval(&vertex, &mut evaluations);
                    simplex[j] = vertex;
                }
            }

            sort(&mut simplex, &mut values);
            iterations += 1;
        }

        if !converged {
            converged = self.has_converged(&simplex, &values);
        }

        debug!(
            iterations,
            evaluations,
            converged,
            value = values[0],
            "Nelder-Mead finished"
        );

        OptimizationResult {
            x: simplex.swap_remove(0),
            value: values[0],
            iterations,
            evaluations,
            converged,
        }
    }
}
