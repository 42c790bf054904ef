// SPDX-License-Identifier: MPL-2.0

//! Calibrated-noise mechanisms.
//!
//! Stateless functions that perturb counts and sums with noise sized to a
//! privacy cost and a sensitivity. Count queries get Gaussian noise (so they
//! compose under the (&epsilon;, &delta;) Gaussian-mechanism tail bound);
//! sum queries get Laplace noise with scale `sensitivity / epsilon`.
//!
//! Every function takes the random source as an argument and draws each
//! element's noise independently, so results are reproducible with a seeded
//! generator and no random state crosses calls. Parameters are validated
//! before any randomness is drawn.
//!
//! Budget is accounted elsewhere: callers must have a successful
//! [`crate::odometer::BudgetLedger::spend`] behind them before invoking any
//! of these.

use crate::budget::{BudgetError, PrivacyCost};
use crate::mechanism::distributions::Laplace;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::Normal;

pub mod distributions;

/// Errors raised by noise mechanisms.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MechanismError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error propagated from privacy-cost handling.
    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),
}

fn check_positive(name: &str, value: f64) -> Result<(), MechanismError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MechanismError::InvalidParameter(format!(
            "{name} must be a finite, positive float, got {value}"
        )));
    }
    Ok(())
}

/// Add independent zero-mean Gaussian noise to each count.
///
/// The standard deviation is `cost.gaussian_scale() / cost.epsilon()`, the
/// classic Gaussian-mechanism calibration for sensitivity-1 counts, so the
/// release satisfies (&epsilon;, &delta;)-DP for the given cost.
pub fn add_count_noise<R>(
    values: &[f64],
    cost: &PrivacyCost,
    rng: &mut R,
) -> Result<Vec<f64>, MechanismError>
where
    R: Rng + ?Sized,
{
    check_positive("epsilon", cost.epsilon())?;
    let sigma = cost.gaussian_scale()? / cost.epsilon();
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| MechanismError::InvalidParameter(e.to_string()))?;
    Ok(values.iter().map(|v| v + normal.sample(rng)).collect())
}

/// Add independent Laplace noise with scale `sensitivity / epsilon` to each
/// sum, rounding the noised result to the nearest integer.
pub fn add_sum_noise_integer<R>(
    values: &[i64],
    sensitivity: f64,
    epsilon: f64,
    rng: &mut R,
) -> Result<Vec<i64>, MechanismError>
where
    R: Rng + ?Sized,
{
    let laplace = laplace_for(sensitivity, epsilon)?;
    Ok(values
        .iter()
        .map(|v| v + laplace.sample(rng).round() as i64)
        .collect())
}

/// Add independent Laplace noise with scale `sensitivity / epsilon` to each
/// sum.
pub fn add_sum_noise_real<R>(
    values: &[f64],
    sensitivity: f64,
    epsilon: f64,
    rng: &mut R,
) -> Result<Vec<f64>, MechanismError>
where
    R: Rng + ?Sized,
{
    let laplace = laplace_for(sensitivity, epsilon)?;
    Ok(values.iter().map(|v| v + laplace.sample(rng)).collect())
}

fn laplace_for(sensitivity: f64, epsilon: f64) -> Result<Laplace, MechanismError> {
    check_positive("sensitivity", sensitivity)?;
    check_positive("epsilon", epsilon)?;
    Laplace::new(0.0, sensitivity / epsilon)
}

/// Privately estimate the `q`-quantile of `sample` within `[lower, upper]`
/// using the exponential mechanism.
///
/// Values are clamped into `[lower, upper]` and sorted; the gap between the
/// `i`-th and `i+1`-th order statistics is selected with probability
/// proportional to `width * exp(-epsilon * |i - q*n| / 2)`, and the result
/// is drawn uniformly inside the selected gap. Non-finite sample values are
/// ignored.
pub fn private_quantile<R>(
    sample: &[f64],
    q: f64,
    epsilon: f64,
    lower: f64,
    upper: f64,
    rng: &mut R,
) -> Result<f64, MechanismError>
where
    R: Rng + ?Sized,
{
    check_positive("epsilon", epsilon)?;
    if !(0.0..=1.0).contains(&q) {
        return Err(MechanismError::InvalidParameter(format!(
            "quantile must be in [0, 1], got {q}"
        )));
    }
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(MechanismError::InvalidParameter(format!(
            "bounds must be finite with lower < upper, got [{lower}, {upper}]"
        )));
    }

    let mut sorted: Vec<f64> = sample
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(lower, upper))
        .collect();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mut edges = Vec::with_capacity(n + 2);
    edges.push(lower);
    edges.extend_from_slice(&sorted);
    edges.push(upper);

    let target = q * n as f64;
    // log-space weights, shifted by the max before exponentiating
    let log_weights: Vec<f64> = edges
        .windows(2)
        .enumerate()
        .map(|(i, gap)| {
            let width = gap[1] - gap[0];
            if width > 0.0 {
                width.ln() - epsilon * (i as f64 - target).abs() / 2.0
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect();
    let max_log = log_weights
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_weights.iter().map(|w| (w - max_log).exp()).collect();
    let total: f64 = weights.iter().sum();

    let mut draw = rng.random_range(0.0..total);
    let mut chosen = weights.len() - 1;
    for (i, w) in weights.iter().enumerate() {
        if draw < *w {
            chosen = i;
            break;
        }
        draw -= w;
    }

    Ok(rng.random_range(edges[chosen]..=edges[chosen + 1]))
}
