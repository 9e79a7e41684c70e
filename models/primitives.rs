//! Scalar density primitives shared by every population model.
//!
//! Both primitives are normalized over a closed interval and vanish outside it.
//! The array forms route the element-wise work through an [`ArrayBackend`];
//! the scalar forms are used where a single density value is needed, such as
//! matching power-law segments at a breakpoint.

use crate::backend::ArrayBackend;
use crate::error::DensityError;
use ndarray::{Array1, ArrayView1};
use statrs::function::erf::{erf, erfc};
use std::f64::consts::{PI, SQRT_2};

/// `alpha` values this close to -1 use the logarithmic normalisation.
const LOG_POWER_LAW_TOLERANCE: f64 = 1e-12;

fn check_support(low: f64, high: f64) -> Result<(), DensityError> {
    // Written so that NaN bounds are rejected as well.
    if !(low < high) {
        return Err(DensityError::InvalidSupport(low, high));
    }
    Ok(())
}

/// Twice the Gaussian probability mass between standardised bounds `a < b`.
///
/// When both bounds sit in the same tail the difference of complementary error
/// functions keeps its precision where `erf(b) - erf(a)` would cancel to zero.
fn standard_normal_mass(a: f64, b: f64) -> f64 {
    if a >= 0.0 {
        erfc(a) - erfc(b)
    } else if b <= 0.0 {
        erfc(-b) - erfc(-a)
    } else {
        erf(b) - erf(a)
    }
}

/// Normalisation constant of a Gaussian truncated to `[low, high]`.
///
/// Zero when the interval carries no representable probability mass, so the
/// density vanishes instead of overflowing.
fn truncated_normal_norm(mean: f64, sigma: f64, low: f64, high: f64) -> Result<f64, DensityError> {
    if !(sigma > 0.0) {
        return Err(DensityError::NonPositiveSigma(sigma));
    }
    check_support(low, high)?;
    let mass = standard_normal_mass((low - mean) / SQRT_2 / sigma, (high - mean) / SQRT_2 / sigma);
    let norm = (2.0 / PI).sqrt() / sigma / mass;
    if mass > 0.0 && norm.is_finite() {
        Ok(norm)
    } else {
        Ok(0.0)
    }
}

/// Normalisation constant of `x^alpha` on `[low, high]`.
fn power_law_norm(alpha: f64, low: f64, high: f64) -> Result<f64, DensityError> {
    if low < 0.0 {
        return Err(DensityError::NegativePowerLawMinimum(low));
    }
    check_support(low, high)?;
    if (alpha + 1.0).abs() < LOG_POWER_LAW_TOLERANCE {
        Ok(1.0 / (high / low).ln())
    } else {
        Ok((1.0 + alpha) / (high.powf(1.0 + alpha) - low.powf(1.0 + alpha)))
    }
}

/// Gaussian density with the given `mean` and `sigma`, truncated and
/// renormalized to `[low, high]`.
pub fn truncated_normal(
    backend: &dyn ArrayBackend,
    x: ArrayView1<f64>,
    mean: f64,
    sigma: f64,
    low: f64,
    high: f64,
) -> Result<Array1<f64>, DensityError> {
    let norm = truncated_normal_norm(mean, sigma, low, high)?;
    Ok(backend.map(x, &|v| {
        if v < low || v > high {
            0.0
        } else {
            (-(v - mean).powi(2) / (2.0 * sigma * sigma)).exp() * norm
        }
    }))
}

/// Power-law density `x^alpha` normalized to `[low, high]`.
///
/// `alpha == -1` uses the logarithmic normalisation `1 / ln(high / low)`.
pub fn power_law(
    backend: &dyn ArrayBackend,
    x: ArrayView1<f64>,
    alpha: f64,
    low: f64,
    high: f64,
) -> Result<Array1<f64>, DensityError> {
    let norm = power_law_norm(alpha, low, high)?;
    Ok(backend.map(x, &|v| {
        if v < low || v > high {
            0.0
        } else {
            v.powf(alpha) * norm
        }
    }))
}

/// Scalar form of [`power_law`].
pub fn power_law_at(x: f64, alpha: f64, low: f64, high: f64) -> Result<f64, DensityError> {
    let norm = power_law_norm(alpha, low, high)?;
    if x < low || x > high {
        return Ok(0.0);
    }
    Ok(x.powf(alpha) * norm)
}
