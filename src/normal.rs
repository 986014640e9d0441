//! Standard normal distribution helpers.
//!
//! Thin wrappers over `statrs`'s error-function routines. The quantile is
//! only defined on the open interval (0, 1); callers validate probabilities
//! before reaching these functions.

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

/// Standard normal CDF, Φ(x). Absolute error is below 1e-10.
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile, Φ⁻¹(p).
///
/// Returns `-inf` at 0 and `+inf` at 1.
#[inline]
pub fn norm_inv(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// True when `p` lies strictly inside (0, 1), i.e. `norm_inv(p)` is finite.
#[inline]
pub fn is_open_unit(p: f64) -> bool {
    p > 0.0 && p < 1.0
}
