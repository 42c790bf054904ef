// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! Noisegate
//!
//! Privacy-budget accounting and calibrated-noise mechanisms for releasing
//! statistics over sensitive datasets under differential privacy.
//!
//! The moving parts, leaves first:
//!
//!  - [`budget::PrivacyCost`]: an (&epsilon;, &delta;) quantity of privacy
//!    loss, composing by component-wise summation.
//!  - [`mechanism`]: stateless noise primitives for counts (Gaussian) and
//!    sums (Laplace), plus an exponential-mechanism quantile.
//!  - [`bounds::approx_bounds`]: private discovery of a column's numeric
//!    range, paid for with a fixed epsilon allowance.
//!  - [`odometer::Odometer`]: the shared ledger every disclosure-bearing
//!    operation debits first; it atomically refuses spends that would
//!    exceed the session's authorization.
//!  - [`transform::MinMaxTransform`]: fit/transform/inverse-transform
//!    normalization of a column, debiting the odometer only when it must
//!    discover bounds privately.
//!
//! Budget spends are never refunded: an operation that fails after its
//! spend was accepted has still disclosed information.

pub mod bounds;
pub mod budget;
pub mod mechanism;
pub mod odometer;
pub mod transform;

pub use bounds::{approx_bounds, BoundsConfig, BoundsError};
pub use budget::{BudgetError, PrivacyCost};
pub use mechanism::{
    add_count_noise, add_sum_noise_integer, add_sum_noise_real, private_quantile, MechanismError,
};
pub use odometer::{BudgetLedger, FreeBudget, Odometer};
pub use transform::{
    Encoded, FittedState, MinMaxTransform, TransformError, TransformOptions, Value,
};
