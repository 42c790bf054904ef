// SPDX-License-Identifier: MPL-2.0

//! Private estimation of a numeric column's range.
//!
//! [`approx_bounds`] buckets a sample into exponentially growing magnitude
//! bins anchored at zero (edges at &plusmn;2^k), noises every bin count
//! through the Laplace mechanism, and reports the outermost edge on each
//! side whose noisy count clears a threshold. The threshold is derived from
//! a configured false-positive probability, so an empty outer bin is
//! unlikely to blow the range up, and the edge search itself is paid for by
//! the epsilon allowance passed in.

use crate::mechanism::{add_sum_noise_real, MechanismError};
use rand::Rng;

/// Errors raised during bounds estimation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BoundsError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error propagated from the noise mechanism.
    #[error("mechanism error: {0}")]
    Mechanism(#[from] MechanismError),
}

/// Tunables for the bin-edge search.
///
/// The defaults cover magnitudes up to 2^31 and keep the chance that any
/// single empty bin spuriously clears the threshold at one in a million.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundsConfig {
    /// Largest bin exponent per side. Bin `k` covers magnitudes in
    /// `[2^(k-1), 2^k)` (bin 0 covers `[0, 1)`); values beyond
    /// `2^max_exponent` land in the outermost bin.
    pub max_exponent: u32,
    /// Probability that a given empty bin's noisy count clears the
    /// threshold. The acceptance threshold is derived from this and the
    /// per-bin noise scale.
    pub false_positive_prob: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            max_exponent: 31,
            false_positive_prob: 1e-6,
        }
    }
}

impl BoundsConfig {
    fn bins_per_side(&self) -> usize {
        self.max_exponent as usize + 1
    }

    /// Noisy-count acceptance threshold for a given Laplace noise scale:
    /// the smallest `t` with `P[Laplace(scale) > t] <= false_positive_prob`.
    fn threshold(&self, noise_scale: f64) -> f64 {
        noise_scale * (1.0 / (2.0 * self.false_positive_prob)).ln()
    }

    fn validate(&self) -> Result<(), BoundsError> {
        if !(0.0..0.5).contains(&self.false_positive_prob) || self.false_positive_prob <= 0.0 {
            return Err(BoundsError::InvalidParameter(format!(
                "false_positive_prob must be in (0, 0.5), got {}",
                self.false_positive_prob
            )));
        }
        Ok(())
    }
}

/// Privately estimate `[lower, upper]` for `sample`, spending `epsilon` in
/// total.
///
/// The allowance is split equally across every candidate bin (both sides),
/// and each bin count is noised independently via
/// [`add_sum_noise_real`] with sensitivity 1. On each side the outermost bin
/// whose noisy count clears the threshold sets that side's bound at the
/// bin's outer edge; a side with no qualifying bin contributes 0 when the
/// other side qualifies. Returns `Ok(None)` when the sample is empty (or
/// entirely non-finite) or when neither side clears the threshold — in the
/// latter case the epsilon has still been consumed by the search.
pub fn approx_bounds<R>(
    sample: &[f64],
    epsilon: f64,
    config: &BoundsConfig,
    rng: &mut R,
) -> Result<Option<(f64, f64)>, BoundsError>
where
    R: Rng + ?Sized,
{
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(BoundsError::InvalidParameter(format!(
            "epsilon must be a finite, positive float, got {epsilon}"
        )));
    }
    config.validate()?;

    let bins = config.bins_per_side();
    let mut negative = vec![0.0; bins];
    let mut positive = vec![0.0; bins];
    let mut seen = false;
    for &v in sample {
        if !v.is_finite() {
            continue;
        }
        seen = true;
        let side = if v < 0.0 { &mut negative } else { &mut positive };
        side[bin_index(v.abs(), config.max_exponent)] += 1.0;
    }
    if !seen {
        return Ok(None);
    }

    // equal split of the entire allowance across all candidate bins
    let per_bin_epsilon = epsilon / (2 * bins) as f64;
    let noise_scale = 1.0 / per_bin_epsilon;
    let threshold = config.threshold(noise_scale);

    let noisy_negative = add_sum_noise_real(&negative, 1.0, per_bin_epsilon, rng)?;
    let noisy_positive = add_sum_noise_real(&positive, 1.0, per_bin_epsilon, rng)?;

    let lower = outermost_edge(&noisy_negative, threshold).map(|edge| -edge);
    let upper = outermost_edge(&noisy_positive, threshold);

    Ok(match (lower, upper) {
        (None, None) => None,
        // one-sided data: the silent side's bound collapses to zero
        (Some(lower), None) => Some((lower, 0.0)),
        (None, Some(upper)) => Some((0.0, upper)),
        (Some(lower), Some(upper)) => Some((lower, upper)),
    })
}

/// Bin holding magnitude `magnitude`: bin 0 is `[0, 1)`, bin k is
/// `[2^(k-1), 2^k)`, clamped to the outermost bin.
fn bin_index(magnitude: f64, max_exponent: u32) -> usize {
    if magnitude < 1.0 {
        0
    } else {
        let k = magnitude.log2().floor() as usize + 1;
        k.min(max_exponent as usize)
    }
}

/// Outer edge (`2^k`) of the outermost bin whose noisy count clears the
/// threshold.
fn outermost_edge(noisy_counts: &[f64], threshold: f64) -> Option<f64> {
    noisy_counts
        .iter()
        .rposition(|count| *count > threshold)
        .map(|k| 2.0_f64.powi(k as i32))
}
