//! Decimal precision policy for quantities, rates, and amounts.
//!
//! CRITICAL: Never use floating-point for valuation. Every stored quantity,
//! rate, and amount is a `rust_decimal::Decimal` rounded with Banker's Rounding
//! (`MidpointNearestEven`) to the precision configured for its field kind.
//! Debits and credits are derived from already-rounded amounts, so the
//! balancing invariant holds exactly.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default decimal places for currency amounts.
pub const DEFAULT_CURRENCY_PRECISION: u32 = 2;

/// Default decimal places for valuation rates.
pub const DEFAULT_RATE_PRECISION: u32 = 9;

/// Default decimal places for stock quantities.
pub const DEFAULT_QTY_PRECISION: u32 = 6;

/// Largest scale `Decimal` can represent.
pub const MAX_PRECISION: u32 = 28;

/// Rounding policy per field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Precision {
    /// Decimal places for amounts (stock value, debit, credit).
    pub currency: u32,
    /// Decimal places for rates (incoming, outgoing, valuation).
    pub rate: u32,
    /// Decimal places for quantities.
    pub qty: u32,
}

impl Precision {
    /// Creates a precision policy.
    #[must_use]
    pub const fn new(currency: u32, rate: u32, qty: u32) -> Self {
        Self {
            currency,
            rate,
            qty,
        }
    }

    /// Rounds a currency amount.
    #[must_use]
    pub fn amount(&self, value: Decimal) -> Decimal {
        round(value, self.currency)
    }

    /// Rounds a valuation rate.
    #[must_use]
    pub fn rate(&self, value: Decimal) -> Decimal {
        round(value, self.rate)
    }

    /// Rounds a quantity.
    #[must_use]
    pub fn qty(&self, value: Decimal) -> Decimal {
        round(value, self.qty)
    }

    /// Multiplies a quantity by a rate and rounds the result as an amount.
    #[must_use]
    pub fn value_of(&self, qty: Decimal, rate: Decimal) -> Decimal {
        self.amount(qty * rate)
    }

    /// Divides an amount by a quantity and rounds the result as a rate.
    ///
    /// Returns `None` when the quantity is zero.
    #[must_use]
    pub fn rate_of(&self, amount: Decimal, qty: Decimal) -> Option<Decimal> {
        if qty.is_zero() {
            return None;
        }
        amount.checked_div(qty).map(|rate| self.rate(rate))
    }

    /// Returns a percentage `part / whole * 100` rounded as an amount.
    ///
    /// A zero whole yields zero.
    #[must_use]
    pub fn percentage(&self, part: Decimal, whole: Decimal) -> Decimal {
        if whole.is_zero() {
            return Decimal::ZERO;
        }
        self.amount(part * Decimal::ONE_HUNDRED / whole)
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::new(
            DEFAULT_CURRENCY_PRECISION,
            DEFAULT_RATE_PRECISION,
            DEFAULT_QTY_PRECISION,
        )
    }
}

fn round(value: Decimal, decimal_places: u32) -> Decimal {
    value
        .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
        .normalize()
}
