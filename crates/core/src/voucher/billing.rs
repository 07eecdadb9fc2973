//! Purchase invoices against receipts.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use kardex_shared::types::{Precision, VoucherLineId};
use rust_decimal::Decimal;

use super::types::{Voucher, VoucherLine, VoucherStatus, VoucherType};
use crate::stock::{StockError, StockResult};

/// Builds and checks purchase invoices.
pub struct BillingService;

impl BillingService {
    /// Checks that `receipt` can be billed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `receipt` is a submitted, open purchase
    /// receipt.
    pub fn ensure_billable(receipt: &Voucher) -> StockResult<()> {
        if receipt.voucher_type != VoucherType::PurchaseReceipt {
            return Err(StockError::Validation(format!(
                "cannot bill a {}",
                receipt.voucher_type
            )));
        }
        if !receipt.is_submitted() {
            return Err(StockError::Validation(format!(
                "receipt {} is not submitted",
                receipt.id
            )));
        }
        if receipt.status == VoucherStatus::Closed {
            return Err(StockError::Validation(format!(
                "receipt {} is closed",
                receipt.id
            )));
        }
        Ok(())
    }

    /// Builds a draft invoice for every unbilled, unreturned quantity.
    ///
    /// A return receipt yields a debit note with negative quantities.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the receipt cannot be billed or nothing is left
    /// to bill.
    pub fn make_invoice(receipt: &Voucher, posted_at: NaiveDateTime) -> StockResult<Voucher> {
        Self::ensure_billable(receipt)?;

        let mut invoice = Voucher::new(VoucherType::PurchaseInvoice, posted_at);
        invoice.against = Some(receipt.id);
        invoice.is_return = receipt.is_return;

        for line in &receipt.lines {
            let billable = line.qty - line.returned_qty - line.billed_qty;
            let open = if receipt.is_return {
                billable < Decimal::ZERO
            } else {
                billable > Decimal::ZERO
            };
            if !open {
                continue;
            }
            let mut bill = VoucherLine::new(line.item.clone(), billable, line.rate).against(line.id);
            bill.cost_center = line.cost_center.clone();
            bill.expense_account = line.expense_account.clone();
            invoice.lines.push(bill);
        }

        if invoice.lines.is_empty() {
            return Err(StockError::Validation(format!(
                "nothing left to bill for receipt {}",
                receipt.id
            )));
        }
        Ok(invoice)
    }

    /// Validates an invoice against its receipt before submission.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-billable receipt or mismatched lines
    /// - `LineNotFound` for an unknown receipt line
    /// - `OverAllowance` when billed qty would exceed the billable qty plus
    ///   `allowance` percent
    pub fn validate(invoice: &Voucher, receipt: &Voucher, allowance: Decimal) -> StockResult<()> {
        Self::ensure_billable(receipt)?;
        if invoice.is_return != receipt.is_return {
            return Err(StockError::Validation(
                "debit notes bill return receipts only".to_string(),
            ));
        }

        let mut totals: BTreeMap<VoucherLineId, Decimal> = BTreeMap::new();
        for line in &invoice.lines {
            let against = line.against_line.ok_or_else(|| {
                StockError::Validation(format!(
                    "invoice line for item {} must reference a receipt line",
                    line.item
                ))
            })?;
            let source = receipt
                .line(against)
                .ok_or(StockError::LineNotFound(against))?;
            if source.item != line.item {
                return Err(StockError::Validation(format!(
                    "invoice line item {} does not match receipt item {}",
                    line.item, source.item
                )));
            }
            *totals.entry(against).or_default() += line.qty;
        }

        let factor = Decimal::ONE + allowance / Decimal::ONE_HUNDRED;
        for (against, qty) in totals {
            let Some(source) = receipt.line(against) else {
                return Err(StockError::LineNotFound(against));
            };
            let attempted = (source.billed_qty + qty).abs();
            let allowed = (source.qty - source.returned_qty).abs() * factor;
            if attempted > allowed {
                return Err(StockError::OverAllowance {
                    item: source.item.clone(),
                    attempted,
                    allowed,
                    allowance,
                });
            }
        }
        Ok(())
    }

    /// Adds (`sign` = 1) or removes (`sign` = -1) an invoice's billed
    /// quantities and amounts on the receipt lines.
    pub fn apply(receipt: &mut Voucher, invoice: &Voucher, sign: Decimal, precision: &Precision) {
        for line in &invoice.lines {
            let Some(against) = line.against_line else {
                continue;
            };
            if let Some(source) = receipt.line_mut(against) {
                source.billed_qty += sign * line.qty;
                source.billed_amt += sign * line.amount(precision);
            }
        }
    }
}
