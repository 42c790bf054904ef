// SPDX-License-Identifier: MPL-2.0

//! Min-max column normalization with private bounds discovery.
//!
//! A [`MinMaxTransform`] maps a numeric column into `[0, 1]` (or `[-1, 1]`)
//! by clipping to a pair of bounds and rescaling. The bounds are either
//! supplied explicitly at construction, which costs nothing, or discovered
//! privately from sample data at fit time, which debits the transform's
//! [`BudgetLedger`] before the search runs. Once fit, transform and inverse
//! calls use the cached bounds and never touch the budget again.
//!
//! Nullable columns encode into a fixed two-slot layout, one numeric slot
//! plus a null flag, so nulls survive the round trip through a numeric
//! feature space.

use crate::bounds::{approx_bounds, BoundsConfig, BoundsError};
use crate::budget::{BudgetError, PrivacyCost};
use crate::odometer::{BudgetLedger, FreeBudget};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Errors raised by column transforms.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    /// `transform` or `inverse_transform` was called before a successful
    /// `fit`. This is a programming error at the call site.
    #[error("transform has not been fit")]
    NotFitted,

    /// The private bounds search could not establish a reliable range. The
    /// budget spent on the search is not refunded.
    #[error("could not find bounds for the column")]
    BoundsNotFound,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The ledger refused the fit's budget spend.
    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    /// Error propagated from bounds estimation.
    #[error("bounds error: {0}")]
    Bounds(#[from] BoundsError),
}

/// A column cell: either a present number or a null.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A present numeric value.
    Present(f64),
    /// A missing value.
    Null,
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Present(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(v) => Value::Present(v),
            None => Value::Null,
        }
    }
}

/// A transformed cell.
///
/// Non-nullable transforms produce [`Encoded::Scalar`]; nullable transforms
/// always produce [`Encoded::WithNullFlag`], whose layout is a numeric slot
/// followed by the null flag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Encoded {
    /// One normalized slot.
    Scalar(f64),
    /// A normalized slot plus a null flag. When the flag is set the numeric
    /// slot carries no information.
    WithNullFlag(f64, bool),
}

impl Encoded {
    /// Flatten to numeric slots: the value and, for nullable encodings, the
    /// flag as `0.0`/`1.0`.
    pub fn to_slots(&self) -> (f64, Option<f64>) {
        match self {
            Encoded::Scalar(v) => (*v, None),
            Encoded::WithNullFlag(v, flag) => (*v, Some(if *flag { 1.0 } else { 0.0 })),
        }
    }

    /// Rebuild from numeric slots. A present flag slot means the nullable
    /// layout; any flag value above one half counts as null.
    pub fn from_slots(value: f64, flag: Option<f64>) -> Self {
        match flag {
            None => Encoded::Scalar(value),
            Some(flag) => Encoded::WithNullFlag(value, flag > 0.5),
        }
    }
}

/// Behavior switches for [`MinMaxTransform`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Scale into `[-1, 1]` instead of `[0, 1]`.
    pub negative: bool,
    /// Accept nulls (and non-finite inputs) and encode them with a null
    /// flag instead of failing.
    pub nullable: bool,
}

/// Serializable fitted state, so a pipeline can save and reload a fitted
/// transform without re-spending budget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedState {
    /// Lower clipping bound.
    pub fit_lower: f64,
    /// Upper clipping bound.
    pub fit_upper: f64,
    /// Whether the transform encodes nulls.
    pub nullable: bool,
    /// Whether the transform scales into `[-1, 1]`.
    pub negative: bool,
    /// Every cost this transform debited, in spend order. Empty when bounds
    /// were explicit.
    pub budget_spent: Vec<PrivacyCost>,
}

/// A fit/transform/inverse-transform unit normalizing one column.
///
/// State machine: Unfit until `fit` succeeds (explicit-bounds construction
/// is fit from the start), then Fit. `fit` on an already-fit transform is a
/// no-op; [`MinMaxTransform::clear_fit`] is the explicit reset.
pub struct MinMaxTransform {
    lower: Option<f64>,
    upper: Option<f64>,
    epsilon: Option<f64>,
    negative: bool,
    nullable: bool,
    bounds_config: BoundsConfig,
    ledger: Arc<dyn BudgetLedger>,
    fit_lower: Option<f64>,
    fit_upper: Option<f64>,
    fit_complete: bool,
    budget_spent: Vec<PrivacyCost>,
}

impl std::fmt::Debug for MinMaxTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinMaxTransform")
            .field("fit_lower", &self.fit_lower)
            .field("fit_upper", &self.fit_upper)
            .field("nullable", &self.nullable)
            .field("negative", &self.negative)
            .field("fit_complete", &self.fit_complete)
            .field("budget_spent", &self.budget_spent)
            .finish_non_exhaustive()
    }
}

impl MinMaxTransform {
    /// Construct with explicit bounds. No budget is ever spent; the
    /// transform is fit immediately.
    pub fn with_bounds(
        lower: f64,
        upper: f64,
        options: TransformOptions,
    ) -> Result<Self, TransformError> {
        check_bounds(lower, upper)?;
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            epsilon: None,
            negative: options.negative,
            nullable: options.nullable,
            bounds_config: BoundsConfig::default(),
            ledger: Arc::new(FreeBudget),
            fit_lower: Some(lower),
            fit_upper: Some(upper),
            fit_complete: true,
            budget_spent: Vec::new(),
        })
    }

    /// Construct with an epsilon allowance for private bounds discovery.
    /// The transform stays unfit until [`MinMaxTransform::fit`] succeeds;
    /// `fit` debits `ledger` for the allowance before searching.
    pub fn with_epsilon(
        epsilon: f64,
        options: TransformOptions,
        ledger: Arc<dyn BudgetLedger>,
    ) -> Result<Self, TransformError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(TransformError::InvalidParameter(format!(
                "epsilon must be a finite, positive float, got {epsilon}"
            )));
        }
        Ok(Self {
            lower: None,
            upper: None,
            epsilon: Some(epsilon),
            negative: options.negative,
            nullable: options.nullable,
            bounds_config: BoundsConfig::default(),
            ledger,
            fit_lower: None,
            fit_upper: None,
            fit_complete: false,
            budget_spent: Vec::new(),
        })
    }

    /// Replace the bin-search configuration used by `fit`.
    pub fn with_bounds_config(mut self, config: BoundsConfig) -> Self {
        self.bounds_config = config;
        self
    }

    /// Whether the transform has reached the Fit state.
    pub fn fit_complete(&self) -> bool {
        self.fit_complete
    }

    /// The fitted bounds, once fit.
    pub fn fit_bounds(&self) -> Option<(f64, f64)> {
        Some((self.fit_lower?, self.fit_upper?))
    }

    /// Every cost this transform has debited, in spend order.
    pub fn budget_spent(&self) -> &[PrivacyCost] {
        &self.budget_spent
    }

    /// Fit on sample data. Idempotent: a transform that is already fit
    /// (including one constructed with explicit bounds) returns without
    /// spending anything; call [`MinMaxTransform::clear_fit`] first to
    /// refit.
    ///
    /// The epsilon allowance is debited before the bounds search runs,
    /// because the search itself discloses information. A search that then
    /// fails leaves the ledger debited; the caller gets
    /// [`TransformError::BoundsNotFound`] and must decide what to do next.
    pub fn fit<R>(&mut self, sample: &[Value], rng: &mut R) -> Result<(), TransformError>
    where
        R: Rng + ?Sized,
    {
        if self.fit_complete {
            return Ok(());
        }
        // construction guarantees epsilon is present whenever bounds are not
        let epsilon = self.epsilon.ok_or_else(|| {
            TransformError::InvalidParameter(
                "transform has neither bounds nor an epsilon allowance".into(),
            )
        })?;

        let cost = PrivacyCost::pure(epsilon)?;
        self.ledger.spend(&cost)?;
        self.budget_spent.push(cost);

        let present: Vec<f64> = sample
            .iter()
            .filter_map(|v| match v {
                Value::Present(v) if v.is_finite() => Some(*v),
                _ => None,
            })
            .collect();
        match approx_bounds(&present, epsilon, &self.bounds_config, rng)? {
            Some((lower, upper)) => {
                self.fit_lower = Some(lower);
                self.fit_upper = Some(upper);
                self.fit_complete = true;
                Ok(())
            }
            None => Err(TransformError::BoundsNotFound),
        }
    }

    /// Reset to the Unfit state. Explicit-bounds transforms snap straight
    /// back to Fit, as their bounds need no rediscovery. The record of past
    /// spends is kept; budget is never refunded.
    pub fn clear_fit(&mut self) {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => {
                self.fit_lower = Some(lower);
                self.fit_upper = Some(upper);
                self.fit_complete = true;
            }
            _ => {
                self.fit_lower = None;
                self.fit_upper = None;
                self.fit_complete = false;
            }
        }
    }

    /// Normalize one value: clip into the fitted bounds, rescale into
    /// `[0, 1]` (or `[-1, 1]` with the `negative` option), and flag nulls
    /// when nullable.
    pub fn transform(&self, value: Value) -> Result<Encoded, TransformError> {
        let (lower, upper) = self.fitted()?;
        let present = match value {
            Value::Present(v) if v.is_finite() => Some(v),
            _ => None,
        };
        match present {
            Some(v) => {
                let clipped = v.clamp(lower, upper);
                let mut scaled = (clipped - lower) / (upper - lower);
                if self.negative {
                    scaled = scaled * 2.0 - 1.0;
                }
                Ok(if self.nullable {
                    Encoded::WithNullFlag(scaled, false)
                } else {
                    Encoded::Scalar(scaled)
                })
            }
            None if self.nullable => Ok(Encoded::WithNullFlag(0.0, true)),
            None => Err(TransformError::InvalidParameter(
                "null or non-finite input to a non-nullable transform".into(),
            )),
        }
    }

    /// Invert one encoded value back into column space. The result is
    /// clipped into the fitted bounds, so corrupted or adversarial encoded
    /// input cannot reconstruct values outside the fitted range. A set null
    /// flag yields [`Value::Null`] without consulting the numeric slot.
    pub fn inverse_transform(&self, encoded: Encoded) -> Result<Value, TransformError> {
        let (lower, upper) = self.fitted()?;
        let slot = match (self.nullable, encoded) {
            (true, Encoded::WithNullFlag(_, true)) => return Ok(Value::Null),
            (true, Encoded::WithNullFlag(v, false)) => v,
            (false, Encoded::Scalar(v)) => v,
            (nullable, other) => {
                return Err(TransformError::InvalidParameter(format!(
                    "encoded shape {other:?} does not match nullable={nullable}"
                )))
            }
        };
        let scaled = if self.negative {
            (slot + 1.0) / 2.0
        } else {
            slot
        };
        let value = scaled * (upper - lower) + lower;
        Ok(Value::Present(value.clamp(lower, upper)))
    }

    /// The fitted state as a flat record, or `None` before fit.
    pub fn state(&self) -> Option<FittedState> {
        if !self.fit_complete {
            return None;
        }
        Some(FittedState {
            fit_lower: self.fit_lower?,
            fit_upper: self.fit_upper?,
            nullable: self.nullable,
            negative: self.negative,
            budget_spent: self.budget_spent.clone(),
        })
    }

    /// Rebuild a fitted transform from saved state. Nothing is re-spent;
    /// the restored transform holds a no-op ledger.
    pub fn from_state(state: FittedState) -> Result<Self, TransformError> {
        check_bounds(state.fit_lower, state.fit_upper)?;
        Ok(Self {
            lower: Some(state.fit_lower),
            upper: Some(state.fit_upper),
            epsilon: None,
            negative: state.negative,
            nullable: state.nullable,
            bounds_config: BoundsConfig::default(),
            ledger: Arc::new(FreeBudget),
            fit_lower: Some(state.fit_lower),
            fit_upper: Some(state.fit_upper),
            fit_complete: true,
            budget_spent: state.budget_spent,
        })
    }

    fn fitted(&self) -> Result<(f64, f64), TransformError> {
        if !self.fit_complete {
            return Err(TransformError::NotFitted);
        }
        match (self.fit_lower, self.fit_upper) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(TransformError::NotFitted),
        }
    }
}

fn check_bounds(lower: f64, upper: f64) -> Result<(), TransformError> {
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(TransformError::InvalidParameter(format!(
            "bounds must be finite with lower < upper, got [{lower}, {upper}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odometer::Odometer;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn explicit(options: TransformOptions) -> MinMaxTransform {
        MinMaxTransform::with_bounds(0.0, 10.0, options).unwrap()
    }

    #[test]
    fn explicit_bounds_round_trip_is_exact() {
        let transform = explicit(TransformOptions::default());
        assert!(transform.budget_spent().is_empty());

        let encoded = transform.transform(Value::Present(5.0)).unwrap();
        assert_eq!(encoded, Encoded::Scalar(0.5));
        assert_eq!(
            transform.inverse_transform(encoded).unwrap(),
            Value::Present(5.0)
        );
    }

    #[test]
    fn out_of_range_input_clips_to_bound() {
        let transform = explicit(TransformOptions::default());
        let encoded = transform.transform(Value::Present(15.0)).unwrap();
        assert_eq!(encoded, Encoded::Scalar(1.0));
        assert_eq!(
            transform.inverse_transform(encoded).unwrap(),
            Value::Present(10.0)
        );

        let below = transform.transform(Value::Present(-3.0)).unwrap();
        assert_eq!(below, Encoded::Scalar(0.0));
    }

    #[test]
    fn negative_mode_scales_into_signed_unit_interval() {
        let transform = explicit(TransformOptions {
            negative: true,
            ..Default::default()
        });
        assert_eq!(
            transform.transform(Value::Present(5.0)).unwrap(),
            Encoded::Scalar(0.0)
        );
        assert_eq!(
            transform.transform(Value::Present(0.0)).unwrap(),
            Encoded::Scalar(-1.0)
        );
        assert_eq!(
            transform
                .inverse_transform(Encoded::Scalar(1.0))
                .unwrap(),
            Value::Present(10.0)
        );
    }

    #[test]
    fn nullable_round_trip() {
        let transform = explicit(TransformOptions {
            nullable: true,
            ..Default::default()
        });

        let null = transform.transform(Value::Null).unwrap();
        assert_eq!(null, Encoded::WithNullFlag(0.0, true));
        assert_eq!(transform.inverse_transform(null).unwrap(), Value::Null);

        // NaN counts as null for a nullable column
        let nan = transform.transform(Value::Present(f64::NAN)).unwrap();
        assert_eq!(nan, Encoded::WithNullFlag(0.0, true));

        let present = transform.transform(Value::Present(2.5)).unwrap();
        assert_eq!(present, Encoded::WithNullFlag(0.25, false));
        assert_eq!(
            transform.inverse_transform(present).unwrap(),
            Value::Present(2.5)
        );
    }

    #[test]
    fn null_rejected_when_not_nullable() {
        let transform = explicit(TransformOptions::default());
        assert_matches!(
            transform.transform(Value::Null),
            Err(TransformError::InvalidParameter(_))
        );
        assert_matches!(
            transform.transform(Value::Present(f64::INFINITY)),
            Err(TransformError::InvalidParameter(_))
        );
    }

    #[test]
    fn encoded_shape_must_match_nullability() {
        let transform = explicit(TransformOptions::default());
        assert_matches!(
            transform.inverse_transform(Encoded::WithNullFlag(0.5, false)),
            Err(TransformError::InvalidParameter(_))
        );
    }

    #[test]
    fn inverse_clips_adversarial_input() {
        let transform = explicit(TransformOptions::default());
        assert_eq!(
            transform.inverse_transform(Encoded::Scalar(7.5)).unwrap(),
            Value::Present(10.0)
        );
        assert_eq!(
            transform.inverse_transform(Encoded::Scalar(-0.5)).unwrap(),
            Value::Present(0.0)
        );
    }

    #[test]
    fn transform_before_fit_fails() {
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(1.0).unwrap()));
        let transform =
            MinMaxTransform::with_epsilon(1.0, TransformOptions::default(), odometer).unwrap();
        assert!(!transform.fit_complete());
        assert_matches!(
            transform.transform(Value::Present(1.0)),
            Err(TransformError::NotFitted)
        );
        assert_matches!(
            transform.inverse_transform(Encoded::Scalar(0.5)),
            Err(TransformError::NotFitted)
        );
    }

    fn dense_sample(rng: &mut StdRng) -> Vec<Value> {
        (0..20_000)
            .map(|_| Value::Present(rng.random_range(-50.0..50.0)))
            .collect()
    }

    #[test]
    fn fit_discovers_bounds_and_debits_ledger() {
        let mut rng = StdRng::seed_from_u64(0x11f);
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(2.0).unwrap()));
        let mut transform = MinMaxTransform::with_epsilon(
            1.0,
            TransformOptions::default(),
            Arc::clone(&odometer) as Arc<dyn BudgetLedger>,
        )
        .unwrap();

        let sample = dense_sample(&mut rng);
        transform.fit(&sample, &mut rng).unwrap();

        assert!(transform.fit_complete());
        let (lower, upper) = transform.fit_bounds().unwrap();
        assert!(lower <= -40.0 && upper >= 40.0);
        assert_eq!(transform.budget_spent().len(), 1);
        assert_eq!(odometer.spent().epsilon(), 1.0);

        // transforming afterwards costs nothing further
        transform.transform(Value::Present(0.0)).unwrap();
        assert_eq!(odometer.spent().epsilon(), 1.0);
    }

    #[test]
    fn second_fit_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(0x22f);
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(2.0).unwrap()));
        let mut transform = MinMaxTransform::with_epsilon(
            1.0,
            TransformOptions::default(),
            Arc::clone(&odometer) as Arc<dyn BudgetLedger>,
        )
        .unwrap();

        let sample = dense_sample(&mut rng);
        transform.fit(&sample, &mut rng).unwrap();
        let bounds = transform.fit_bounds();

        transform.fit(&sample, &mut rng).unwrap();
        assert_eq!(transform.fit_bounds(), bounds);
        assert_eq!(transform.budget_spent().len(), 1);
        assert_eq!(odometer.spent().epsilon(), 1.0);

        // an explicit reset allows (and charges for) a refit
        transform.clear_fit();
        assert!(!transform.fit_complete());
        transform.fit(&sample, &mut rng).unwrap();
        assert_eq!(transform.budget_spent().len(), 2);
        assert_eq!(odometer.spent().epsilon(), 2.0);
    }

    #[test]
    fn denied_spend_surfaces_and_spends_nothing() {
        let mut rng = StdRng::seed_from_u64(0x33f);
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(0.5).unwrap()));
        let mut transform = MinMaxTransform::with_epsilon(
            1.0,
            TransformOptions::default(),
            Arc::clone(&odometer) as Arc<dyn BudgetLedger>,
        )
        .unwrap();

        let sample = dense_sample(&mut rng);
        let err = transform.fit(&sample, &mut rng).unwrap_err();
        assert_matches!(err, TransformError::Budget(BudgetError::Denied { .. }));
        assert!(odometer.spent().is_free());
        assert!(transform.budget_spent().is_empty());
        assert!(!transform.fit_complete());
    }

    #[test]
    fn failed_search_keeps_the_budget_spent() {
        let mut rng = StdRng::seed_from_u64(0x44f);
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(2.0).unwrap()));
        let mut transform = MinMaxTransform::with_epsilon(
            1.0,
            TransformOptions::default(),
            Arc::clone(&odometer) as Arc<dyn BudgetLedger>,
        )
        .unwrap();

        // far too sparse for the search threshold
        let sample = vec![Value::Present(1.0), Value::Present(2.0)];
        let err = transform.fit(&sample, &mut rng).unwrap_err();
        assert_matches!(err, TransformError::BoundsNotFound);

        // the search disclosed information; the spend stays on the ledger
        assert_eq!(odometer.spent().epsilon(), 1.0);
        assert_eq!(transform.budget_spent().len(), 1);
        assert!(!transform.fit_complete());
    }

    #[test]
    fn clear_fit_restores_explicit_bounds() {
        let mut transform = explicit(TransformOptions::default());
        transform.clear_fit();
        assert!(transform.fit_complete());
        assert_eq!(transform.fit_bounds(), Some((0.0, 10.0)));
    }

    #[test]
    fn state_round_trip_preserves_behavior() {
        let transform = explicit(TransformOptions {
            negative: true,
            nullable: true,
        });
        let state = transform.state().unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let restored =
            MinMaxTransform::from_state(serde_json::from_str(&json).unwrap()).unwrap();

        for value in [Value::Present(0.0), Value::Present(7.3), Value::Null] {
            let encoded = transform.transform(value).unwrap();
            assert_eq!(restored.transform(value).unwrap(), encoded);
            assert_eq!(
                restored.inverse_transform(encoded).unwrap(),
                transform.inverse_transform(encoded).unwrap()
            );
        }
    }

    #[test]
    fn unfit_transform_has_no_state() {
        let odometer = Arc::new(Odometer::new(PrivacyCost::pure(1.0).unwrap()));
        let transform =
            MinMaxTransform::with_epsilon(1.0, TransformOptions::default(), odometer).unwrap();
        assert!(transform.state().is_none());
    }

    #[test]
    fn slot_layout_round_trips() {
        let encoded = Encoded::WithNullFlag(0.25, false);
        let (value, flag) = encoded.to_slots();
        assert_eq!(Encoded::from_slots(value, flag), encoded);

        let null = Encoded::WithNullFlag(0.0, true);
        let (value, flag) = null.to_slots();
        assert_eq!(flag, Some(1.0));
        assert_eq!(Encoded::from_slots(value, flag), null);
    }
}
