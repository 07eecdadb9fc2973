//! Voucher line validation.
//!
//! Runs before anything is appended to the ledgers. Checks are independent of
//! ledger state; return, billing and serial checks that need history live
//! with their own modules.

use kardex_shared::types::Precision;
use rust_decimal::Decimal;

use super::types::{Voucher, VoucherLine, VoucherType};
use crate::stock::{StockError, StockResult};

/// Validates document shape and normalises received quantities.
pub struct VoucherValidator;

impl VoucherValidator {
    /// Validates every line of a draft voucher.
    ///
    /// A zero `received_qty` is filled in with accepted plus rejected qty.
    ///
    /// # Errors
    ///
    /// - `Validation` for structural problems (no lines, missing or clashing
    ///   warehouses, negative rates, returns of unsupported types)
    /// - `InvalidQty` for zero or wrongly signed quantities
    /// - `QtyMismatch` when received qty disagrees with accepted plus rejected
    pub fn validate(voucher: &mut Voucher, precision: &Precision) -> StockResult<()> {
        if voucher.lines.is_empty() {
            return Err(StockError::Validation(format!(
                "{} has no lines",
                voucher.voucher_type
            )));
        }
        if voucher.is_return && !voucher.voucher_type.allows_returns() {
            return Err(StockError::Validation(format!(
                "{} does not support returns",
                voucher.voucher_type
            )));
        }
        if voucher.is_return && voucher.against.is_none() {
            return Err(StockError::Validation(
                "return must reference the original voucher".to_string(),
            ));
        }
        if voucher.voucher_type == VoucherType::PurchaseInvoice && voucher.against.is_none() {
            return Err(StockError::Validation(
                "purchase invoice must reference a purchase receipt".to_string(),
            ));
        }

        let voucher_type = voucher.voucher_type;
        let is_return = voucher.is_return;
        for line in &mut voucher.lines {
            if line.rate.is_sign_negative() && !line.rate.is_zero() {
                return Err(StockError::Validation(format!(
                    "rate for item {} must not be negative",
                    line.item
                )));
            }
            line.qty = precision.qty(line.qty);
            line.rejected_qty = precision.qty(line.rejected_qty);

            match voucher_type {
                VoucherType::PurchaseReceipt => Self::receipt_line(line, is_return)?,
                VoucherType::PurchaseInvoice => Self::signed_qty(line, is_return)?,
                VoucherType::DeliveryNote => {
                    Self::signed_qty(line, is_return)?;
                    Self::require_warehouse(line)?;
                    Self::distinct_target(line)?;
                }
                VoucherType::MaterialReceipt | VoucherType::MaterialIssue => {
                    Self::signed_qty(line, false)?;
                    Self::require_warehouse(line)?;
                }
                VoucherType::StockTransfer => {
                    Self::signed_qty(line, false)?;
                    Self::require_warehouse(line)?;
                    if line.target_warehouse.is_none() {
                        return Err(StockError::Validation(format!(
                            "transfer of item {} needs a target warehouse",
                            line.item
                        )));
                    }
                    Self::distinct_target(line)?;
                }
            }
        }
        Ok(())
    }

    fn receipt_line(line: &mut VoucherLine, is_return: bool) -> StockResult<()> {
        let wrong_sign = |qty: Decimal| {
            if is_return {
                qty > Decimal::ZERO
            } else {
                qty < Decimal::ZERO
            }
        };
        if wrong_sign(line.qty) || (line.qty.is_zero() && line.rejected_qty.is_zero()) {
            return Err(StockError::InvalidQty {
                item: line.item.clone(),
                qty: line.qty,
            });
        }
        if wrong_sign(line.rejected_qty) {
            return Err(StockError::InvalidQty {
                item: line.item.clone(),
                qty: line.rejected_qty,
            });
        }

        let expected = line.qty + line.rejected_qty;
        if line.received_qty.is_zero() {
            line.received_qty = expected;
        } else if line.received_qty != expected {
            return Err(StockError::QtyMismatch {
                item: line.item.clone(),
                received: line.received_qty,
                accepted: line.qty,
                rejected: line.rejected_qty,
            });
        }

        if !line.qty.is_zero() {
            Self::require_warehouse(line)?;
        }
        if !line.rejected_qty.is_zero() {
            match (&line.rejected_warehouse, &line.warehouse) {
                (None, _) => {
                    return Err(StockError::Validation(format!(
                        "rejected qty of item {} needs a rejected warehouse",
                        line.item
                    )));
                }
                (Some(rejected), Some(accepted)) if rejected == accepted => {
                    return Err(StockError::Validation(format!(
                        "rejected warehouse {rejected} of item {} must differ from the accepted warehouse",
                        line.item
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn signed_qty(line: &VoucherLine, is_return: bool) -> StockResult<()> {
        let ok = if is_return {
            line.qty < Decimal::ZERO
        } else {
            line.qty > Decimal::ZERO
        };
        if !ok {
            return Err(StockError::InvalidQty {
                item: line.item.clone(),
                qty: line.qty,
            });
        }
        Ok(())
    }

    fn require_warehouse(line: &VoucherLine) -> StockResult<()> {
        if line.warehouse.is_none() {
            return Err(StockError::Validation(format!(
                "item {} needs a warehouse",
                line.item
            )));
        }
        Ok(())
    }

    fn distinct_target(line: &VoucherLine) -> StockResult<()> {
        if line.target_warehouse.is_some() && line.target_warehouse == line.warehouse {
            return Err(StockError::Validation(format!(
                "source and target warehouse of item {} must differ",
                line.item
            )));
        }
        Ok(())
    }
}
