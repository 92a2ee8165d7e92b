//! Presentation rounding
//!
//! Internal computation always runs at full `f64` precision; these helpers
//! are applied only when a result is rendered for a caller.

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round every element of a series
pub fn round_series(values: &[f64], decimals: u32) -> Vec<f64> {
    values.iter().map(|v| round_to(*v, decimals)).collect()
}
