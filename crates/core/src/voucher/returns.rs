//! Return resolution.
//!
//! Builds draft returns from submitted vouchers, validates returns before
//! they are submitted, and maintains the returned quantities on the original
//! lines.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use kardex_shared::types::{SerialNo, VoucherLineId, WarehouseCode};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::types::{Voucher, VoucherLine, VoucherStatus};
use crate::stock::{StockError, StockResult};

/// Quantity to return against one original line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnRequest {
    /// The original line.
    pub line: VoucherLineId,
    /// Accepted quantity to return (positive).
    pub qty: Decimal,
    /// Rejected quantity to return (positive).
    pub rejected_qty: Decimal,
}

impl ReturnRequest {
    /// Returns accepted quantity only.
    #[must_use]
    pub const fn accepted(line: VoucherLineId, qty: Decimal) -> Self {
        Self {
            line,
            qty,
            rejected_qty: Decimal::ZERO,
        }
    }
}

/// Builds and checks returns.
pub struct ReturnResolver;

impl ReturnResolver {
    /// Checks that `original` can still be returned against.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the original is not submitted, is closed, is
    /// itself a return, or its type does not support returns.
    pub fn ensure_returnable(original: &Voucher) -> StockResult<()> {
        if !original.is_submitted() {
            return Err(StockError::Validation(format!(
                "voucher {} is not submitted",
                original.id
            )));
        }
        if original.status == VoucherStatus::Closed {
            return Err(StockError::Validation(format!(
                "voucher {} is closed",
                original.id
            )));
        }
        if original.is_return {
            return Err(StockError::Validation(format!(
                "voucher {} is itself a return",
                original.id
            )));
        }
        if !original.voucher_type.allows_returns() {
            return Err(StockError::Validation(format!(
                "{} does not support returns",
                original.voucher_type
            )));
        }
        Ok(())
    }

    /// Builds a draft return for the requested quantities.
    ///
    /// `in_stock` filters serial numbers down to those still held in a
    /// warehouse; the first ones are picked for the return.
    ///
    /// # Errors
    ///
    /// - `Validation` if the original is not returnable or nothing is requested
    /// - `LineNotFound` for a request naming an unknown line
    pub fn make_return(
        original: &Voucher,
        requests: &[ReturnRequest],
        posted_at: NaiveDateTime,
        in_stock: &dyn Fn(&[SerialNo], &WarehouseCode) -> Vec<SerialNo>,
    ) -> StockResult<Voucher> {
        Self::ensure_returnable(original)?;

        let mut draft = Voucher::new(original.voucher_type, posted_at).as_return_against(original.id);
        for request in requests {
            if request.qty.is_zero() && request.rejected_qty.is_zero() {
                continue;
            }
            let source = original
                .line(request.line)
                .ok_or(StockError::LineNotFound(request.line))?;

            let mut line = VoucherLine::new(source.item.clone(), -request.qty, source.rate);
            line.warehouse = source.warehouse.clone();
            line.rejected_qty = -request.rejected_qty;
            if !request.rejected_qty.is_zero() {
                line.rejected_warehouse = source.rejected_warehouse.clone();
            }
            line.received_qty = line.qty + line.rejected_qty;
            line.cost_center = source.cost_center.clone();
            line.expense_account = source.expense_account.clone();
            line.allow_zero_valuation_rate = source.allow_zero_valuation_rate;
            line.against_line = Some(source.id);
            line.serial_nos = pick_serials(&source.serial_nos, source.warehouse.as_ref(), request.qty, in_stock);
            line.rejected_serial_nos = pick_serials(
                &source.rejected_serial_nos,
                source.rejected_warehouse.as_ref(),
                request.rejected_qty,
                in_stock,
            );
            draft.lines.push(line);
        }

        if draft.lines.is_empty() {
            return Err(StockError::Validation(format!(
                "nothing to return against voucher {}",
                original.id
            )));
        }
        Ok(draft)
    }

    /// Requests for every accepted and rejected quantity not yet returned.
    #[must_use]
    pub fn full_return_requests(original: &Voucher) -> Vec<ReturnRequest> {
        original
            .lines
            .iter()
            .map(|line| ReturnRequest {
                line: line.id,
                qty: (line.qty - line.returned_qty).max(Decimal::ZERO),
                rejected_qty: (line.rejected_qty - line.returned_rejected_qty).max(Decimal::ZERO),
            })
            .collect()
    }

    /// Requests for every rejected quantity not yet returned.
    #[must_use]
    pub fn rejected_return_requests(original: &Voucher) -> Vec<ReturnRequest> {
        original
            .lines
            .iter()
            .map(|line| ReturnRequest {
                line: line.id,
                qty: Decimal::ZERO,
                rejected_qty: (line.rejected_qty - line.returned_rejected_qty).max(Decimal::ZERO),
            })
            .collect()
    }

    /// Validates a return against its original before submission.
    ///
    /// Cumulative returned quantity per original line may not exceed the
    /// original quantity plus `allowance` percent.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-returnable original or mismatched lines
    /// - `LineNotFound` for an unknown original line
    /// - `OverAllowance` when too much would be returned
    pub fn validate(ret: &Voucher, original: &Voucher, allowance: Decimal) -> StockResult<()> {
        Self::ensure_returnable(original)?;
        if ret.voucher_type != original.voucher_type {
            return Err(StockError::Validation(format!(
                "{} cannot return a {}",
                ret.voucher_type, original.voucher_type
            )));
        }

        let mut totals: BTreeMap<VoucherLineId, (Decimal, Decimal)> = BTreeMap::new();
        for line in &ret.lines {
            let against = line.against_line.ok_or_else(|| {
                StockError::Validation(format!(
                    "return line for item {} must reference an original line",
                    line.item
                ))
            })?;
            let source = original
                .line(against)
                .ok_or(StockError::LineNotFound(against))?;
            if source.item != line.item {
                return Err(StockError::Validation(format!(
                    "return line item {} does not match original item {}",
                    line.item, source.item
                )));
            }
            if !line.qty.is_zero() && line.warehouse != source.warehouse {
                return Err(StockError::Validation(format!(
                    "item {} must be returned from the warehouse it was received in",
                    line.item
                )));
            }
            if !line.rejected_qty.is_zero() && line.rejected_warehouse != source.rejected_warehouse {
                return Err(StockError::Validation(format!(
                    "rejected item {} must be returned from the rejected warehouse",
                    line.item
                )));
            }
            let entry = totals.entry(against).or_default();
            entry.0 += -line.qty;
            entry.1 += -line.rejected_qty;
        }

        let factor = Decimal::ONE + allowance / Decimal::ONE_HUNDRED;
        for (against, (qty, rejected_qty)) in totals {
            let Some(source) = original.line(against) else {
                return Err(StockError::LineNotFound(against));
            };
            for (already, returning, received) in [
                (source.returned_qty, qty, source.qty),
                (source.returned_rejected_qty, rejected_qty, source.rejected_qty),
            ] {
                let attempted = already + returning;
                let allowed = received * factor;
                if returning > Decimal::ZERO && attempted > allowed {
                    return Err(StockError::OverAllowance {
                        item: source.item.clone(),
                        attempted,
                        allowed,
                        allowance,
                    });
                }
            }
        }
        Ok(())
    }

    /// Adds (`sign` = 1) or removes (`sign` = -1) a return's quantities on the
    /// original lines.
    pub fn apply(original: &mut Voucher, ret: &Voucher, sign: Decimal) {
        for line in &ret.lines {
            let Some(against) = line.against_line else {
                continue;
            };
            if let Some(source) = original.line_mut(against) {
                source.returned_qty -= sign * line.qty;
                source.returned_rejected_qty -= sign * line.rejected_qty;
            }
        }
    }
}

fn pick_serials(
    serials: &[SerialNo],
    warehouse: Option<&WarehouseCode>,
    qty: Decimal,
    in_stock: &dyn Fn(&[SerialNo], &WarehouseCode) -> Vec<SerialNo>,
) -> Vec<SerialNo> {
    let (Some(warehouse), Some(count)) = (warehouse, qty.to_usize()) else {
        return Vec::new();
    };
    if serials.is_empty() || qty.is_zero() {
        return Vec::new();
    }
    in_stock(serials, warehouse).into_iter().take(count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::DocStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn all_in_stock(serials: &[SerialNo], _: &WarehouseCode) -> Vec<SerialNo> {
        serials.to_vec()
    }

    fn submitted() -> Voucher {
        let mut voucher = Voucher::purchase_receipt(at()).with_line(
            VoucherLine::new("A", dec!(5), dec!(50))
                .with_warehouse("Stores")
                .with_rejected(dec!(2), "Rejected")
                .with_received_qty(dec!(7)),
        );
        voucher.doc_status = DocStatus::Submitted;
        voucher.status = VoucherStatus::ToBill;
        voucher
    }

    #[test]
    fn test_make_return_negates_qty() {
        let original = submitted();
        let line = original.lines[0].id;
        let ret = ReturnResolver::make_return(
            &original,
            &[ReturnRequest::accepted(line, dec!(2))],
            at(),
            &all_in_stock,
        )
        .unwrap();

        assert!(ret.is_return);
        assert_eq!(ret.against, Some(original.id));
        assert_eq!(ret.lines[0].qty, dec!(-2));
        assert_eq!(ret.lines[0].rate, dec!(50));
        assert_eq!(ret.lines[0].against_line, Some(line));
        assert_eq!(ret.lines[0].warehouse, original.lines[0].warehouse);
    }

    #[test]
    fn test_full_and_rejected_requests() {
        let mut original = submitted();
        original.lines[0].returned_qty = dec!(1);

        let full = ReturnResolver::full_return_requests(&original);
        assert_eq!(full[0].qty, dec!(4));
        assert_eq!(full[0].rejected_qty, dec!(2));

        let rejected = ReturnResolver::rejected_return_requests(&original);
        assert_eq!(rejected[0].qty, Decimal::ZERO);
        assert_eq!(rejected[0].rejected_qty, dec!(2));
    }

    #[test]
    fn test_return_over_received_qty() {
        let original = submitted();
        let line = original.lines[0].id;
        let ret = ReturnResolver::make_return(
            &original,
            &[ReturnRequest::accepted(line, dec!(6))],
            at(),
            &all_in_stock,
        )
        .unwrap();
        let err = ReturnResolver::validate(&ret, &original, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, StockError::OverAllowance { .. }));

        assert!(ReturnResolver::validate(&ret, &original, dec!(20)).is_ok());
    }

    #[test]
    fn test_closed_original_not_returnable() {
        let mut original = submitted();
        original.status = VoucherStatus::Closed;
        assert!(ReturnResolver::ensure_returnable(&original).is_err());
    }

    #[test]
    fn test_return_of_return_refused() {
        let mut original = submitted();
        original.is_return = true;
        assert!(ReturnResolver::ensure_returnable(&original).is_err());
    }

    #[test]
    fn test_apply_and_revert() {
        let mut original = submitted();
        let line = original.lines[0].id;
        let ret = ReturnResolver::make_return(
            &original,
            &[ReturnRequest {
                line,
                qty: dec!(2),
                rejected_qty: dec!(1),
            }],
            at(),
            &all_in_stock,
        )
        .unwrap();

        ReturnResolver::apply(&mut original, &ret, Decimal::ONE);
        assert_eq!(original.lines[0].returned_qty, dec!(2));
        assert_eq!(original.lines[0].returned_rejected_qty, dec!(1));

        ReturnResolver::apply(&mut original, &ret, Decimal::NEGATIVE_ONE);
        assert_eq!(original.lines[0].returned_qty, Decimal::ZERO);
        assert_eq!(original.lines[0].returned_rejected_qty, Decimal::ZERO);
    }

    #[test]
    fn test_serials_picked_from_stock() {
        let mut original = submitted();
        original.lines[0].serial_nos = vec!["S1".into(), "S2".into(), "S3".into()];
        let line = original.lines[0].id;
        let only_last_two = |serials: &[SerialNo], _: &WarehouseCode| serials[1..].to_vec();
        let ret = ReturnResolver::make_return(
            &original,
            &[ReturnRequest::accepted(line, dec!(1))],
            at(),
            &only_last_two,
        )
        .unwrap();
        assert_eq!(ret.lines[0].serial_nos, vec![SerialNo::from("S2")]);
    }
}
