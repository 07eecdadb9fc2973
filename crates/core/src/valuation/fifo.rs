//! FIFO lot queue.
//!
//! The queue holds `(qty, rate)` lots in arrival order. A bin that ran below
//! zero holds a single negative lot, which the next receipt fills first.

use std::collections::VecDeque;

use kardex_shared::types::Precision;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A lot of stock received at one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoLot {
    /// Quantity left in the lot (negative for a stock shortfall).
    pub qty: Decimal,
    /// Rate the lot was received at.
    pub rate: Decimal,
}

impl FifoLot {
    /// Creates a lot.
    #[must_use]
    pub const fn new(qty: Decimal, rate: Decimal) -> Self {
        Self { qty, rate }
    }
}

/// Ordered queue of lots, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FifoQueue {
    lots: VecDeque<FifoLot>,
}

impl FifoQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lots, oldest first.
    pub fn lots(&self) -> impl Iterator<Item = &FifoLot> {
        self.lots.iter()
    }

    /// Returns true if the queue holds no lots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Sum of lot quantities.
    #[must_use]
    pub fn total_qty(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.qty).sum()
    }

    /// Sum of lot values, rounded as an amount.
    #[must_use]
    pub fn total_value(&self, precision: &Precision) -> Decimal {
        precision.amount(self.lots.iter().map(|lot| lot.qty * lot.rate).sum())
    }

    /// Adds received stock.
    ///
    /// A trailing lot at the same rate absorbs the quantity. A trailing
    /// shortfall lot is filled first; what remains becomes a lot at `rate`.
    pub fn add_stock(&mut self, qty: Decimal, rate: Decimal) {
        let Some(last) = self.lots.back_mut() else {
            self.lots.push_back(FifoLot::new(qty, rate));
            return;
        };

        if last.rate == rate {
            last.qty += qty;
        } else if last.qty > Decimal::ZERO {
            self.lots.push_back(FifoLot::new(qty, rate));
        } else {
            let remaining = last.qty + qty;
            if remaining > Decimal::ZERO {
                *last = FifoLot::new(remaining, rate);
            } else {
                last.qty = remaining;
            }
        }
    }

    /// Removes stock and returns the consumed lots.
    ///
    /// With an `outgoing_rate`, lots at exactly that rate are consumed first.
    /// If no lot carries that rate, the whole queue collapses into one lot
    /// holding the remaining value. Consuming past the last lot leaves a
    /// single negative lot at the outgoing rate, or at the rate of the last
    /// consumed lot.
    pub fn remove_stock(
        &mut self,
        qty: Decimal,
        outgoing_rate: Option<Decimal>,
        precision: &Precision,
    ) -> Vec<FifoLot> {
        let outgoing_rate = outgoing_rate.filter(|rate| *rate > Decimal::ZERO);
        let mut remaining = qty;
        let mut consumed = Vec::new();

        while remaining > Decimal::ZERO {
            if self.lots.is_empty() {
                self.lots.push_back(FifoLot::new(Decimal::ZERO, Decimal::ZERO));
            }

            let index = match outgoing_rate {
                Some(rate) => match self.lots.iter().position(|lot| lot.rate == rate) {
                    Some(index) => index,
                    None => {
                        self.collapse(remaining, rate, precision);
                        consumed.push(FifoLot::new(remaining, rate));
                        break;
                    }
                },
                None => 0,
            };

            let lot_qty = self.lots[index].qty;
            if remaining >= lot_qty {
                remaining -= lot_qty;
                let Some(taken) = self.lots.remove(index) else {
                    break;
                };
                consumed.push(taken);
                if self.lots.is_empty() && remaining > Decimal::ZERO {
                    let rate = outgoing_rate.unwrap_or(taken.rate);
                    self.lots.push_back(FifoLot::new(-remaining, rate));
                    consumed.push(FifoLot::new(remaining, rate));
                    break;
                }
            } else {
                self.lots[index].qty -= remaining;
                consumed.push(FifoLot::new(remaining, self.lots[index].rate));
                remaining = Decimal::ZERO;
            }
        }

        consumed
    }

    fn collapse(&mut self, qty: Decimal, rate: Decimal, precision: &Precision) {
        let value: Decimal =
            self.lots.iter().map(|lot| lot.qty * lot.rate).sum::<Decimal>() - qty * rate;
        let total_qty = self.total_qty() - qty;
        let collapsed_rate = if total_qty > Decimal::ZERO {
            precision.rate_of(value, total_qty).unwrap_or(rate)
        } else {
            rate
        };
        self.lots.clear();
        self.lots.push_back(FifoLot::new(total_qty, collapsed_rate));
    }
}
