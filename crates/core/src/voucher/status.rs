//! Voucher status machine.
//!
//! Status is derived, never set directly, except for `Closed` which the user
//! toggles. The derivation runs after every submit or cancel that touches a
//! voucher's returned or billed aggregates.

use kardex_shared::types::Precision;
use rust_decimal::Decimal;

use super::types::{DocStatus, Voucher, VoucherStatus, VoucherType};
use crate::stock::{StockError, StockResult};

const FULL: Decimal = Decimal::ONE_HUNDRED;

/// Derives billing/return percentages and status.
pub struct StatusService;

impl StatusService {
    /// Percentage of received quantity returned.
    #[must_use]
    pub fn per_returned(voucher: &Voucher, precision: &Precision) -> Decimal {
        let received: Decimal = voucher
            .lines
            .iter()
            .map(|line| {
                if line.received_qty.is_zero() {
                    line.qty + line.rejected_qty
                } else {
                    line.received_qty
                }
            })
            .sum();
        let returned: Decimal = voucher
            .lines
            .iter()
            .map(|line| line.returned_qty + line.returned_rejected_qty)
            .sum();
        precision.percentage(returned, received)
    }

    /// Percentage of the net (not returned) amount billed.
    #[must_use]
    pub fn per_billed(voucher: &Voucher, precision: &Precision) -> Decimal {
        let amount = voucher.total_amount(precision);
        let returned_amount: Decimal = voucher
            .lines
            .iter()
            .map(|line| precision.value_of(line.returned_qty, line.rate))
            .sum();
        let billed: Decimal = voucher.lines.iter().map(|line| line.billed_amt).sum();
        precision.percentage(billed, amount - returned_amount)
    }

    /// Status implied by the percentages of a submitted voucher.
    #[must_use]
    pub fn derive(voucher: &Voucher) -> VoucherStatus {
        match voucher.doc_status {
            DocStatus::Draft => return VoucherStatus::Draft,
            DocStatus::Cancelled => return VoucherStatus::Cancelled,
            DocStatus::Submitted => {}
        }
        if voucher.status == VoucherStatus::Closed {
            return VoucherStatus::Closed;
        }

        let billable = voucher.voucher_type == VoucherType::PurchaseReceipt && !voucher.is_return;
        if voucher.per_returned >= FULL {
            VoucherStatus::ReturnIssued
        } else if !billable || voucher.per_billed >= FULL {
            if voucher.per_returned > Decimal::ZERO && !billable {
                VoucherStatus::PartlyReturned
            } else {
                VoucherStatus::Completed
            }
        } else if voucher.per_billed > Decimal::ZERO {
            VoucherStatus::PartlyBilled
        } else if voucher.per_returned > Decimal::ZERO {
            VoucherStatus::PartlyReturned
        } else {
            VoucherStatus::ToBill
        }
    }

    /// Recomputes percentages and status in place.
    pub fn refresh(voucher: &mut Voucher, precision: &Precision) {
        if !voucher.is_return {
            voucher.per_returned = Self::per_returned(voucher, precision);
        }
        if voucher.voucher_type == VoucherType::PurchaseReceipt {
            voucher.per_billed = Self::per_billed(voucher, precision);
        }
        voucher.status = Self::derive(voucher);
    }

    /// Closes a submitted voucher.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the voucher is submitted and open.
    pub fn close(voucher: &mut Voucher) -> StockResult<()> {
        if !voucher.is_submitted() || voucher.status == VoucherStatus::Closed {
            return Err(StockError::InvalidTransition {
                from: voucher.status.to_string(),
                to: VoucherStatus::Closed.to_string(),
            });
        }
        voucher.status = VoucherStatus::Closed;
        Ok(())
    }

    /// Reopens a closed voucher and re-derives its status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the voucher is closed.
    pub fn reopen(voucher: &mut Voucher, precision: &Precision) -> StockResult<()> {
        if voucher.status != VoucherStatus::Closed {
            return Err(StockError::InvalidTransition {
                from: voucher.status.to_string(),
                to: "open".to_string(),
            });
        }
        voucher.status = VoucherStatus::ToBill;
        Self::refresh(voucher, precision);
        Ok(())
    }
}
