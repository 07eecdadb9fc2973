//! Allocation of valuation charges over voucher lines.
//!
//! Each charge is split over lines with accepted quantity in proportion to
//! the chosen basis. Shares are rounded as amounts; the last eligible line
//! takes the remainder so the shares always sum to the charge.

use kardex_shared::types::{AccountCode, Precision};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{AllocationBasis, LineCharge, Voucher, VoucherLine};
use crate::stock::{StockError, StockResult};

/// A charge to add to the valuation of a receipt after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCharge {
    /// Account credited with the charge.
    pub account: AccountCode,
    /// Total amount (may be negative).
    pub amount: Decimal,
}

impl LandedCharge {
    /// Creates a landed charge.
    #[must_use]
    pub fn new(account: impl Into<AccountCode>, amount: Decimal) -> Self {
        Self {
            account: account.into(),
            amount,
        }
    }
}

/// Distributes charges over lines.
pub struct ChargeAllocator;

impl ChargeAllocator {
    /// Splits `amount` over the lines with positive accepted quantity.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no line can carry the charge.
    pub fn allocate(
        lines: &mut [VoucherLine],
        account: &AccountCode,
        amount: Decimal,
        basis: AllocationBasis,
        precision: &Precision,
    ) -> StockResult<()> {
        let weight = |line: &VoucherLine| match basis {
            AllocationBasis::Amount => line.amount(precision),
            AllocationBasis::Qty => line.qty,
        };
        let eligible: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|&(_, line)| line.qty > Decimal::ZERO && weight(line) > Decimal::ZERO)
            .map(|(index, _)| index)
            .collect();
        let amount = precision.amount(amount);
        let total_weight: Decimal = eligible.iter().map(|index| weight(&lines[*index])).sum();
        let Some((last, rest)) = eligible.split_last() else {
            return Err(StockError::Validation(format!(
                "no line can carry charge {account}"
            )));
        };

        let mut allocated = Decimal::ZERO;
        for index in rest {
            let share = precision.amount(amount * weight(&lines[*index]) / total_weight);
            allocated += share;
            lines[*index].charges.push(LineCharge {
                account: account.clone(),
                amount: share,
            });
        }
        lines[*last].charges.push(LineCharge {
            account: account.clone(),
            amount: amount - allocated,
        });
        Ok(())
    }

    /// Allocates every voucher-level charge onto the lines.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a charge cannot be carried by any line.
    pub fn allocate_voucher_charges(voucher: &mut Voucher, precision: &Precision) -> StockResult<()> {
        let charges = voucher.charges.clone();
        for charge in charges {
            if charge.amount.is_zero() {
                continue;
            }
            Self::allocate(
                &mut voucher.lines,
                &charge.account,
                charge.amount,
                charge.basis,
                precision,
            )?;
        }
        Ok(())
    }
}
