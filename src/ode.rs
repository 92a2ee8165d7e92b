//! Adaptive explicit Runge-Kutta integration
//!
//! Dormand-Prince 5(4) with local error control, a bounded step size and a
//! hard ceiling on attempted steps, so every solve terminates. The state is
//! a fixed-size array; the fitness-fatigue model integrates two components.

use crate::error::CalculationError;
use serde::{Deserialize, Serialize};

/// Integrator tolerances and ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Relative tolerance
    pub rtol: f64,

    /// Absolute tolerance
    pub atol: f64,

    /// Largest step the integrator may take
    pub max_step: f64,

    /// Hard ceiling on attempted steps (accepted and rejected)
    pub max_steps: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            rtol: 1e-3,
            atol: 1e-6,
            max_step: 0.5,
            max_steps: 2_000_000,
        }
    }
}

// Dormand-Prince tableau
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];
// Fifth-order weights (also row 6 of A, first-same-as-last)
const B: [f64; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];
// Difference between fifth- and fourth-order weights
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Dormand-Prince 5(4) integrator
#[derive(Debug, Clone, Default)]
pub struct DormandPrince {
    config: IntegratorConfig,
}

impl DormandPrince {
    pub fn new() -> Self {
        DormandPrince {
            config: IntegratorConfig::default(),
        }
    }

    pub fn with_config(config: IntegratorConfig) -> Self {
        DormandPrince { config }
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrate `dy/dt = f(t, y)` from `(t0, y0)`, reporting the state at
    /// each time in `t_eval` (ascending, all ≥ `t0`)
    pub fn integrate<F, const N: usize>(
        &self,
        f: F,
        t0: f64,
        y0: [f64; N],
        t_eval: &[f64],
    ) -> Result<Vec<[f64; N]>, CalculationError>
    where
        F: Fn(f64, &[f64; N]) -> [f64; N],
    {
        if t_eval.windows(2).any(|w| w[1] < w[0]) || t_eval.first().is_some_and(|t| *t < t0) {
            return Err(CalculationError::Integration {
                reason: "evaluation times must be ascending and not precede the start".to_string(),
            });
        }

        let mut output = Vec::with_capacity(t_eval.len());
        let Some(&t_final) = t_eval.last() else {
            return Ok(output);
        };

        let mut t = t0;
        let mut y = y0;
        let mut dy = f(t, &y);
        let mut h = self.initial_step(&f, t0, &y0, &dy, t_final - t0);
        let mut steps = 0usize;
        let mut next = 0usize;

        while next < t_eval.len() && t_eval[next] <= t {
            output.push(y);
            next += 1;
        }

        while next < t_eval.len() {
            if steps >= self.config.max_steps {
                return Err(CalculationError::Integration {
                    reason: format!("step ceiling of {} reached at t={:.3}", self.config.max_steps, t),
                });
            }
            steps += 1;

            let target = t_eval[next];
            h = h.min(self.config.max_step).min(target - t);
            let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
            if h < min_step {
                if target - t <= min_step {
                    // Snap onto an evaluation point we are already sitting on
                    t = target;
                    output.push(y);
                    next += 1;
                    continue;
                }
                return Err(CalculationError::Integration {
                    reason: format!("step size underflow at t={:.3}", t),
                });
            }

            let (y_new, dy_new, error) = self.step(&f, t, &y, &dy, h);

            if !error.is_finite() || y_new.iter().any(|v| !v.is_finite()) {
                return Err(CalculationError::NonFinite {
                    calculation: "Runge-Kutta step".to_string(),
                });
            }

            if error <= 1.0 {
                t = if (target - (t + h)).abs() <= min_step { target } else { t + h };
                y = y_new;
                dy = dy_new;

                while next < t_eval.len() && t_eval[next] <= t {
                    output.push(y);
                    next += 1;
                }

                let factor = if error == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * error.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                };
                h *= factor;
            } else {
                h *= (SAFETY * error.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
            }
        }

        Ok(output)
    }

    /// One Dormand-Prince step; returns the new state, its derivative and the
    /// scaled RMS error estimate
    fn step<F, const N: usize>(
        &self,
        f: &F,
        t: f64,
        y: &[f64; N],
        dy: &[f64; N],
        h: f64,
    ) -> ([f64; N], [f64; N], f64)
    where
        F: Fn(f64, &[f64; N]) -> [f64; N],
    {
        let mut k = [[0.0; N]; 7];
        k[0] = *dy;

        for s in 1..6 {
            let mut stage = *y;
            for (i, value) in stage.iter_mut().enumerate() {
                *value += h * (0..s).map(|j| A[s][j] * k[j][i]).sum::<f64>();
            }
            k[s] = f(t + C[s] * h, &stage);
        }

        let mut y_new = *y;
        for (i, value) in y_new.iter_mut().enumerate() {
            *value += h * (0..6).map(|j| B[j] * k[j][i]).sum::<f64>();
        }
        k[6] = f(t + h, &y_new);

        let mut sum_sq = 0.0;
        for i in 0..N {
            let err = h * (0..7).map(|j| E[j] * k[j][i]).sum::<f64>();
            let scale = self.config.atol + self.config.rtol * y[i].abs().max(y_new[i].abs());
            sum_sq += (err / scale).powi(2);
        }
        let error = if N == 0 { 0.0 } else { (sum_sq / N as f64).sqrt() };

        (y_new, k[6], error)
    }

    /// Starting step size from the local scale of the problem
    fn initial_step<F, const N: usize>(
        &self,
        f: &F,
        t0: f64,
        y0: &[f64; N],
        dy0: &[f64; N],
        span: f64,
    ) -> f64
    where
        F: Fn(f64, &[f64; N]) -> [f64; N],
    {
        if span <= 0.0 || N == 0 {
            return self.config.max_step;
        }

        let scale: Vec<f64> = y0
            .iter()
            .map(|v| self.config.atol + self.config.rtol * v.abs())
            .collect();
        let rms = |v: &[f64; N]| {
            (v.iter().zip(&scale).map(|(x, s)| (x / s).powi(2)).sum::<f64>() / N as f64).sqrt()
        };

        let d0 = rms(y0);
        let d1 = rms(dy0);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
        let h0 = h0.min(span);

        let mut y1 = *y0;
        for (i, value) in y1.iter_mut().enumerate() {
            *value += h0 * dy0[i];
        }
        let dy1 = f(t0 + h0, &y1);
        let mut diff = [0.0; N];
        for i in 0..N {
            diff[i] = dy1[i] - dy0[i];
        }
        let d2 = rms(&diff) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };

        (100.0 * h0).min(h1).min(span).min(self.config.max_step)
    }
}
