// SPDX-License-Identifier: MPL-2.0

//! Privacy-loss accounting values.
//!
//! A [`PrivacyCost`] is an (&epsilon;, &delta;) pair quantifying how much
//! information a single mechanism invocation discloses. Costs compose
//! sequentially by component-wise summation; the [`crate::odometer`] module
//! enforces a ceiling on the composed total.

use serde::Serialize;
use std::iter::Sum;
use std::ops::Add;

/// Errors raised while constructing or spending privacy costs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BudgetError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A spend was refused because it would push cumulative loss past the
    /// authorized ceiling. The ledger state is unchanged.
    #[error(
        "budget denied: requested (epsilon {}, delta {}) exceeds remaining (epsilon {}, delta {})",
        .requested.epsilon(),
        .requested.delta(),
        .remaining.epsilon(),
        .remaining.delta()
    )]
    Denied {
        /// The cost that was refused.
        requested: PrivacyCost,
        /// What the ledger had left at the time of refusal.
        remaining: PrivacyCost,
    },
}

/// An immutable quantity of privacy loss.
///
/// Both components are finite and non-negative; `(0, 0)` denotes a free
/// (disclosure-less) operation. Construction validates, so a held value
/// always upholds the invariant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PrivacyCost {
    epsilon: f64,
    delta: f64,
}

impl PrivacyCost {
    /// The largest representable cost. Stands in for an unbounded
    /// allowance.
    pub(crate) const MAX: PrivacyCost = PrivacyCost {
        epsilon: f64::MAX,
        delta: f64::MAX,
    };

    /// Construct a cost from epsilon and delta. Errors unless both are
    /// finite and non-negative.
    pub fn new(epsilon: f64, delta: f64) -> Result<Self, BudgetError> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(BudgetError::InvalidParameter(format!(
                "epsilon must be a finite, non-negative float, got {epsilon}"
            )));
        }
        if !delta.is_finite() || delta < 0.0 {
            return Err(BudgetError::InvalidParameter(format!(
                "delta must be a finite, non-negative float, got {delta}"
            )));
        }
        Ok(Self { epsilon, delta })
    }

    /// A pure-DP cost: epsilon with delta of zero.
    pub fn pure(epsilon: f64) -> Result<Self, BudgetError> {
        Self::new(epsilon, 0.0)
    }

    /// The zero cost. Spending it discloses nothing and always succeeds.
    pub fn free() -> Self {
        Self {
            epsilon: 0.0,
            delta: 0.0,
        }
    }

    /// The epsilon component.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// The delta component.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Whether both components are zero.
    pub fn is_free(&self) -> bool {
        self.epsilon == 0.0 && self.delta == 0.0
    }

    /// True if this cost fits component-wise inside `other`.
    pub(crate) fn fits_within(&self, other: &PrivacyCost) -> bool {
        self.epsilon <= other.epsilon && self.delta <= other.delta
    }

    /// Component-wise difference, saturating at zero.
    pub(crate) fn saturating_sub(&self, other: &PrivacyCost) -> PrivacyCost {
        PrivacyCost {
            epsilon: (self.epsilon - other.epsilon).max(0.0),
            delta: (self.delta - other.delta).max(0.0),
        }
    }

    /// The delta-adjusted Gaussian calibration factor `sqrt(2 ln(1.25/delta))`.
    ///
    /// Dividing this by epsilon yields the standard deviation of Gaussian
    /// noise satisfying (&epsilon;, &delta;)-DP for a sensitivity-1 count.
    /// Requires `0 < delta < 1`.
    pub fn gaussian_scale(&self) -> Result<f64, BudgetError> {
        if self.delta <= 0.0 || self.delta >= 1.0 {
            return Err(BudgetError::InvalidParameter(format!(
                "Gaussian calibration requires 0 < delta < 1, got {}",
                self.delta
            )));
        }
        Ok((2.0 * (1.25 / self.delta).ln()).sqrt())
    }
}

impl Add for PrivacyCost {
    type Output = PrivacyCost;

    /// Sequential composition: losses of independently released mechanisms
    /// add component-wise.
    fn add(self, rhs: PrivacyCost) -> PrivacyCost {
        PrivacyCost {
            epsilon: self.epsilon + rhs.epsilon,
            delta: self.delta + rhs.delta,
        }
    }
}

impl Sum for PrivacyCost {
    fn sum<I: Iterator<Item = PrivacyCost>>(iter: I) -> PrivacyCost {
        iter.fold(PrivacyCost::free(), Add::add)
    }
}

/// Deserialization helper. Wraps the derived `Deserialize` in one that
/// re-runs the constructor, so decoded costs uphold the same invariants as
/// constructed ones.
mod cost_serde {
    use serde::{de, Deserialize};

    #[derive(Deserialize)]
    pub struct PrivacyCost {
        epsilon: f64,
        delta: f64,
    }

    impl<'de> Deserialize<'de> for super::PrivacyCost {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let helper = PrivacyCost::deserialize(deserializer)?;
            super::PrivacyCost::new(helper.epsilon, helper.delta)
                .map_err(|e| de::Error::custom(e.to_string()))
        }
    }
}
