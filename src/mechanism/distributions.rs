// SPDX-License-Identifier: MPL-2.0

//! Noise distributions not covered by `rand_distr`.

use crate::mechanism::MechanismError;
use rand::distr::Distribution;
use rand::Rng;

/// The Laplace (double-exponential) distribution.
///
/// Sampled by inverse transform: with `U` uniform on (-1/2, 1/2),
/// `location - scale * sgn(U) * ln(1 - 2|U|)` is Laplace-distributed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Laplace {
    location: f64,
    scale: f64,
}

impl Laplace {
    /// Construct a Laplace distribution. The scale must be finite and
    /// positive.
    pub fn new(location: f64, scale: f64) -> Result<Self, MechanismError> {
        if !location.is_finite() {
            return Err(MechanismError::InvalidParameter(format!(
                "location must be finite, got {location}"
            )));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(MechanismError::InvalidParameter(format!(
                "scale must be a finite, positive float, got {scale}"
            )));
        }
        Ok(Self { location, scale })
    }

    /// The distribution's scale parameter `b`. The standard deviation is
    /// `b * sqrt(2)`.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Distribution<f64> for Laplace {
    fn sample<R>(&self, rng: &mut R) -> f64
    where
        R: Rng + ?Sized,
    {
        let u: f64 = rng.random_range(-0.5..0.5);
        // ln_1p keeps precision for draws close to zero
        self.location - self.scale * u.signum() * (-2.0 * u.abs()).ln_1p()
    }
}
