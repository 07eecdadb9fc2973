//! Valuation engine.
//!
//! Folds one movement into the running state of a bin. The engine is a pure
//! function of the previous state and the movement, which is what makes
//! reposting deterministic: replaying the same entries from the same starting
//! state always yields the same stored values.

use chrono::NaiveDateTime;
use kardex_shared::types::Precision;
use kardex_shared::{StockSettings, ValuationMethod, ZeroRatePolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::fifo::FifoQueue;
use super::method::{Movement, MovementRate, ZeroRateStrategy};
use crate::stock::{BinKey, StockError, StockResult};

/// Running state of a bin after some movement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinState {
    /// Quantity on hand.
    pub qty: Decimal,
    /// Total value on hand.
    pub value: Decimal,
    /// Valuation rate.
    pub rate: Decimal,
    /// FIFO lots (empty for moving-average items).
    pub queue: FifoQueue,
}

/// Balance of a bin at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinSnapshot {
    /// Quantity on hand.
    pub qty: Decimal,
    /// Total value on hand.
    pub value: Decimal,
    /// Valuation rate.
    pub rate: Decimal,
}

impl From<&BinState> for BinSnapshot {
    fn from(state: &BinState) -> Self {
        Self {
            qty: state.qty,
            value: state.value,
            rate: state.rate,
        }
    }
}

/// Result of valuing one movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valuation {
    /// State after the movement.
    pub state: BinState,
    /// Rate of an incoming movement, zero otherwise.
    pub incoming_rate: Decimal,
    /// Rate of an outgoing movement, zero otherwise.
    pub outgoing_rate: Decimal,
    /// Change of bin value.
    pub stock_value_difference: Decimal,
}

/// Computes valuation for movements under the configured settings.
#[derive(Debug, Clone, Copy)]
pub struct ValuationEngine {
    precision: Precision,
    allow_negative_stock: bool,
    zero_rate_policy: ZeroRatePolicy,
}

impl ValuationEngine {
    /// Creates an engine from stock settings and a precision policy.
    #[must_use]
    pub fn new(settings: &StockSettings, precision: Precision) -> Self {
        Self {
            precision,
            allow_negative_stock: settings.allow_negative_stock,
            zero_rate_policy: settings.zero_rate_policy,
        }
    }

    /// Returns the precision policy.
    #[must_use]
    pub const fn precision(&self) -> &Precision {
        &self.precision
    }

    /// Values `movement` against the bin state `prev`.
    ///
    /// # Errors
    ///
    /// - `ZeroValuationRate` if an incoming rate is zero and the zero-rate
    ///   policy refuses it.
    /// - `NegativeStock` if the bin would go below zero while negative stock
    ///   is not allowed.
    pub fn apply(
        &self,
        key: &BinKey,
        posted_at: NaiveDateTime,
        method: ValuationMethod,
        prev: &BinState,
        movement: &Movement,
    ) -> StockResult<Valuation> {
        self.check_zero_rate(key, movement)?;

        let new_qty = self.precision.qty(prev.qty + movement.qty);
        if new_qty.is_sign_negative() && !new_qty.is_zero() && !self.allow_negative_stock {
            return Err(StockError::NegativeStock {
                item: key.item.clone(),
                warehouse: key.warehouse.clone(),
                qty_after: new_qty,
                posted_at,
            });
        }

        let (state, incoming_rate, outgoing_rate) = match method {
            ValuationMethod::MovingAverage => self.moving_average(prev, movement, new_qty),
            ValuationMethod::Fifo => self.fifo(prev, movement, new_qty),
        };

        Ok(Valuation {
            stock_value_difference: self.precision.amount(state.value - prev.value),
            state,
            incoming_rate,
            outgoing_rate,
        })
    }

    fn check_zero_rate(&self, key: &BinKey, movement: &Movement) -> StockResult<()> {
        let zero = match movement.rate {
            MovementRate::Incoming(rate) => rate.is_zero(),
            MovementRate::IncomingValue(value) => value.is_zero(),
            MovementRate::OutgoingAtValuation | MovementRate::OutgoingAt(_) => false,
        };
        if zero
            && !self
                .zero_rate_policy
                .permits_zero_rate(movement.allow_zero_valuation_rate)
        {
            return Err(StockError::ZeroValuationRate {
                item: key.item.clone(),
                warehouse: key.warehouse.clone(),
            });
        }
        Ok(())
    }

    /// Rate and value of an incoming movement.
    fn incoming_terms(&self, movement: &Movement) -> (Decimal, Decimal) {
        let p = &self.precision;
        match movement.rate {
            MovementRate::Incoming(rate) => (rate, p.value_of(movement.qty, rate)),
            MovementRate::IncomingValue(value) => (
                p.rate_of(value, movement.qty).unwrap_or(Decimal::ZERO),
                p.amount(value),
            ),
            MovementRate::OutgoingAtValuation | MovementRate::OutgoingAt(_) => {
                (Decimal::ZERO, Decimal::ZERO)
            }
        }
    }

    fn moving_average(
        &self,
        prev: &BinState,
        movement: &Movement,
        new_qty: Decimal,
    ) -> (BinState, Decimal, Decimal) {
        let p = &self.precision;
        let settle = |value: Decimal, rate: Decimal| {
            let value = if new_qty.is_zero() { Decimal::ZERO } else { value };
            BinState {
                qty: new_qty,
                value,
                rate,
                queue: FifoQueue::new(),
            }
        };

        match movement.rate {
            MovementRate::Incoming(_) | MovementRate::IncomingValue(_) => {
                let (in_rate, in_value) = self.incoming_terms(movement);
                let state = if prev.qty > Decimal::ZERO && new_qty > Decimal::ZERO {
                    let value = p.amount(prev.value + in_value);
                    let rate = p.rate_of(value, new_qty).unwrap_or(prev.rate);
                    settle(value, rate)
                } else {
                    settle(p.value_of(new_qty, in_rate), in_rate)
                };
                (state, in_rate, Decimal::ZERO)
            }
            MovementRate::OutgoingAtValuation => (
                settle(p.value_of(new_qty, prev.rate), prev.rate),
                Decimal::ZERO,
                prev.rate,
            ),
            MovementRate::OutgoingAt(out_rate) => {
                let value = p.amount(prev.value + p.value_of(movement.qty, out_rate));
                let state = if prev.qty > Decimal::ZERO
                    && new_qty > Decimal::ZERO
                    && !value.is_sign_negative()
                {
                    let rate = p.rate_of(value, new_qty).unwrap_or(prev.rate);
                    settle(value, rate)
                } else {
                    settle(p.value_of(new_qty, prev.rate), prev.rate)
                };
                (state, Decimal::ZERO, out_rate)
            }
        }
    }

    fn fifo(
        &self,
        prev: &BinState,
        movement: &Movement,
        new_qty: Decimal,
    ) -> (BinState, Decimal, Decimal) {
        let p = &self.precision;
        let mut queue = prev.queue.clone();

        let (incoming_rate, fallback_rate) = match movement.rate {
            MovementRate::Incoming(_) | MovementRate::IncomingValue(_) => {
                let (in_rate, _) = self.incoming_terms(movement);
                queue.add_stock(movement.qty, in_rate);
                (in_rate, in_rate)
            }
            MovementRate::OutgoingAtValuation => {
                queue.remove_stock(-movement.qty, None, p);
                (Decimal::ZERO, prev.rate)
            }
            MovementRate::OutgoingAt(rate) => {
                queue.remove_stock(-movement.qty, Some(rate), p);
                (Decimal::ZERO, prev.rate)
            }
        };

        let (value, rate) = if new_qty.is_zero() {
            (Decimal::ZERO, fallback_rate)
        } else {
            let value = queue.total_value(p);
            (value, p.rate_of(value, new_qty).unwrap_or(fallback_rate))
        };

        let outgoing_rate = if movement.rate.is_incoming() {
            Decimal::ZERO
        } else {
            p.rate_of(prev.value - value, -movement.qty)
                .unwrap_or(Decimal::ZERO)
        };

        (
            BinState {
                qty: new_qty,
                value,
                rate,
                queue,
            },
            incoming_rate,
            outgoing_rate,
        )
    }
}
