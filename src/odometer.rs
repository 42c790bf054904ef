// SPDX-License-Identifier: MPL-2.0

//! The budget ledger.
//!
//! An [`Odometer`] accumulates [`PrivacyCost`] entries against an authorized
//! allowance and refuses any spend that would push the cumulative total past
//! it. It is the single source of truth for whether a mechanism invocation
//! may proceed: mechanisms are never run before a successful
//! [`BudgetLedger::spend`].
//!
//! Spends are never refunded. A mechanism that fails after its spend was
//! accepted has still disclosed information, so the ledger stays debited.

use crate::budget::{BudgetError, PrivacyCost};
use std::sync::Mutex;

/// A ledger that budget-consuming operations debit before disclosing
/// anything.
///
/// Implementors must make `spend` atomic: concurrent callers either observe
/// the full effect of a spend or none of it, never an intermediate state.
pub trait BudgetLedger: Send + Sync {
    /// Attempt to debit `cost`. Returns `Ok(())` if the ledger accepted the
    /// spend, or [`BudgetError::Denied`] (with the ledger unchanged) if the
    /// spend would exceed the authorization. Denial is terminal for the
    /// request; the ledger never retries on the caller's behalf.
    fn spend(&self, cost: &PrivacyCost) -> Result<(), BudgetError>;

    /// How much allowance is left, for planning. The answer may be stale by
    /// the time the caller acts on it; only `spend` is authoritative.
    fn remaining(&self) -> PrivacyCost;
}

/// A concurrent privacy-loss odometer with a hard ceiling.
///
/// Created once per release session and shared (via `Arc`) by every
/// budget-consuming operation in that session. `spent` only ever grows.
#[derive(Debug)]
pub struct Odometer {
    authorized: PrivacyCost,
    spent: Mutex<PrivacyCost>,
}

impl Odometer {
    /// Create an odometer authorized to spend up to `authorized` in total.
    pub fn new(authorized: PrivacyCost) -> Self {
        Self {
            authorized,
            spent: Mutex::new(PrivacyCost::free()),
        }
    }

    /// The ceiling this odometer was created with.
    pub fn authorized(&self) -> PrivacyCost {
        self.authorized
    }

    /// Cumulative loss accepted so far.
    pub fn spent(&self) -> PrivacyCost {
        *self.spent.lock().unwrap()
    }
}

impl BudgetLedger for Odometer {
    fn spend(&self, cost: &PrivacyCost) -> Result<(), BudgetError> {
        // Check and update under one lock so no partial spend is ever
        // visible. Mutex poisoning cannot occur: no code path panics while
        // holding the lock.
        let mut spent = self.spent.lock().unwrap();
        let proposed = *spent + *cost;
        if proposed.fits_within(&self.authorized) {
            *spent = proposed;
            Ok(())
        } else {
            Err(BudgetError::Denied {
                requested: *cost,
                remaining: self.authorized.saturating_sub(&spent),
            })
        }
    }

    fn remaining(&self) -> PrivacyCost {
        self.authorized.saturating_sub(&self.spent())
    }
}

/// The no-op ledger: accepts every spend at zero cost.
///
/// Held by operations that were configured with explicit, caller-supplied
/// parameters and therefore disclose nothing, so call sites never branch on
/// whether a ledger is present.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeBudget;

impl BudgetLedger for FreeBudget {
    fn spend(&self, _cost: &PrivacyCost) -> Result<(), BudgetError> {
        Ok(())
    }

    fn remaining(&self) -> PrivacyCost {
        // unbounded allowance; MAX is as close as a finite cost gets
        PrivacyCost::MAX
    }
}
