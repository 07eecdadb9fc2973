//! Translation of vouchers and their stock movements into GL postings.
//!
//! Inventory accounts always follow the stock value difference of the
//! voucher's entries. Counter accounts follow the voucher type. Whatever the
//! two sides leave unbalanced lands in the stock adjustment account.

use std::collections::BTreeMap;

use kardex_shared::StockSettings;
use kardex_shared::types::{AccountCode, CostCenterCode, Precision};
use rust_decimal::Decimal;

use super::entry::GlPosting;
use super::resolver::AccountResolver;
use crate::stock::StockLedgerEntry;
use crate::voucher::{Voucher, VoucherLine, VoucherType};

/// Signed amounts accumulated per (account, cost center).
#[derive(Debug, Default)]
struct PostingSet {
    amounts: BTreeMap<(AccountCode, CostCenterCode), Decimal>,
}

impl PostingSet {
    fn debit(&mut self, account: AccountCode, cost_center: CostCenterCode, amount: Decimal) {
        *self.amounts.entry((account, cost_center)).or_default() += amount;
    }

    fn credit(&mut self, account: AccountCode, cost_center: CostCenterCode, amount: Decimal) {
        self.debit(account, cost_center, -amount);
    }

    fn round(&mut self, precision: &Precision) {
        for amount in self.amounts.values_mut() {
            *amount = precision.amount(*amount);
        }
    }

    fn residual(&self) -> Decimal {
        self.amounts.values().copied().sum()
    }

    fn into_postings(self, precision: &Precision) -> Vec<GlPosting> {
        self.amounts
            .into_iter()
            .map(|((account, cost_center), amount)| (account, cost_center, precision.amount(amount)))
            .filter(|(_, _, amount)| !amount.is_zero())
            .map(|(account, cost_center, amount)| GlPosting::from_signed(account, cost_center, amount))
            .collect()
    }
}

/// Produces the expected GL postings of a voucher.
pub struct GlTranslator;

impl GlTranslator {
    /// Expected postings of `voucher` given its active stock `entries`.
    ///
    /// The result is aggregated per (account, cost center) with zero pairs
    /// dropped, and always balances.
    #[must_use]
    pub fn translate(
        voucher: &Voucher,
        entries: &[&StockLedgerEntry],
        settings: &StockSettings,
        accounts: &dyn AccountResolver,
        precision: &Precision,
    ) -> Vec<GlPosting> {
        if voucher.voucher_type.moves_stock() && !settings.perpetual_inventory {
            return Vec::new();
        }

        let mut set = PostingSet::default();
        let cost_center = |line: Option<&VoucherLine>| {
            line.and_then(|line| line.cost_center.clone())
                .unwrap_or_else(|| accounts.default_cost_center())
        };

        for entry in entries {
            let line = voucher.line(entry.voucher_line_id);
            set.debit(
                accounts.inventory_account(&entry.warehouse),
                cost_center(line),
                entry.stock_value_difference,
            );
        }

        match voucher.voucher_type {
            VoucherType::PurchaseReceipt => {
                for line in &voucher.lines {
                    let mut billable = line.amount(precision);
                    if settings.value_rejected_materials {
                        billable += precision.value_of(line.rejected_qty, line.rate);
                    }
                    set.credit(
                        accounts.stock_received_but_not_billed(),
                        cost_center(Some(line)),
                        billable,
                    );
                    Self::credit_charges(&mut set, line, cost_center(Some(line)));
                }
            }
            VoucherType::MaterialReceipt => {
                for line in &voucher.lines {
                    let account = line
                        .expense_account
                        .clone()
                        .unwrap_or_else(|| accounts.stock_adjustment());
                    set.credit(account, cost_center(Some(line)), line.amount(precision));
                    Self::credit_charges(&mut set, line, cost_center(Some(line)));
                }
            }
            VoucherType::DeliveryNote | VoucherType::MaterialIssue => {
                for entry in entries {
                    let Some(line) = voucher.line(entry.voucher_line_id) else {
                        continue;
                    };
                    if line.target_warehouse.is_some() {
                        continue;
                    }
                    let account = line
                        .expense_account
                        .clone()
                        .unwrap_or_else(|| accounts.default_expense());
                    set.credit(account, cost_center(Some(line)), entry.stock_value_difference);
                }
            }
            VoucherType::StockTransfer => {}
            VoucherType::PurchaseInvoice => {
                for line in &voucher.lines {
                    let account = if settings.perpetual_inventory {
                        accounts.stock_received_but_not_billed()
                    } else {
                        line.expense_account
                            .clone()
                            .unwrap_or_else(|| accounts.default_expense())
                    };
                    let amount = line.amount(precision);
                    set.debit(account, cost_center(Some(line)), amount);
                    set.credit(accounts.creditors(), accounts.default_cost_center(), amount);
                }
            }
        }

        // Residual of rounded pairs, so the rounded postings balance exactly.
        set.round(precision);
        let residual = set.residual();
        if !residual.is_zero() {
            set.credit(
                accounts.stock_adjustment(),
                accounts.default_cost_center(),
                residual,
            );
        }
        set.into_postings(precision)
    }

    fn credit_charges(set: &mut PostingSet, line: &VoucherLine, cost_center: CostCenterCode) {
        for charge in &line.charges {
            set.credit(charge.account.clone(), cost_center.clone(), charge.amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::{PostingKey, RateSource};
    use crate::valuation::FifoQueue;
    use chrono::{NaiveDate, NaiveDateTime};
    use kardex_shared::config::AccountDefaults;
    use kardex_shared::types::{StockEntryId, WarehouseCode};
    use rust_decimal_macros::dec;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn entry(voucher: &Voucher, line: usize, warehouse: &str, qty: Decimal, svd: Decimal) -> StockLedgerEntry {
        StockLedgerEntry {
            id: StockEntryId::new(),
            item: voucher.lines[line].item.clone(),
            warehouse: WarehouseCode::from(warehouse),
            voucher_type: voucher.voucher_type,
            voucher_id: voucher.id,
            voucher_line_id: voucher.lines[line].id,
            posting: PostingKey::new(voucher.posted_at, 1),
            actual_qty: qty,
            rate_source: RateSource::Valuation,
            allow_zero_valuation_rate: false,
            incoming_rate: Decimal::ZERO,
            outgoing_rate: Decimal::ZERO,
            valuation_rate: Decimal::ZERO,
            qty_after_transaction: Decimal::ZERO,
            stock_value: Decimal::ZERO,
            stock_value_difference: svd,
            stock_queue: FifoQueue::new(),
            is_cancelled: false,
            is_reversal: false,
        }
    }

    fn amount_of(postings: &[GlPosting], account: &str) -> Decimal {
        postings
            .iter()
            .filter(|p| p.account == AccountCode::from(account))
            .map(GlPosting::signed_amount)
            .sum()
    }

    fn total(postings: &[GlPosting]) -> Decimal {
        postings.iter().map(GlPosting::signed_amount).sum()
    }

    #[test]
    fn test_receipt_with_charges() {
        let accounts = AccountDefaults::default();
        let precision = Precision::default();
        let receipt = Voucher::purchase_receipt(at()).with_line(
            VoucherLine::new("A", dec!(5), dec!(50))
                .with_warehouse("Stores")
                .with_charge("Freight", dec!(25)),
        );
        let sle = entry(&receipt, 0, "Stores", dec!(5), dec!(275));

        let postings = GlTranslator::translate(
            &receipt,
            &[&sle],
            &StockSettings::default(),
            &accounts,
            &precision,
        );
        assert_eq!(amount_of(&postings, "Stock In Hand"), dec!(275));
        assert_eq!(amount_of(&postings, "Stock Received But Not Billed"), dec!(-250));
        assert_eq!(amount_of(&postings, "Freight"), dec!(-25));
        assert_eq!(amount_of(&postings, "Stock Adjustment"), Decimal::ZERO);
        assert_eq!(total(&postings), Decimal::ZERO);
    }

    #[test]
    fn test_sub_cent_charge_still_balances() {
        let accounts = AccountDefaults::default();
        let precision = Precision::default();
        let receipt = Voucher::purchase_receipt(at()).with_line(
            VoucherLine::new("A", dec!(3), dec!(10))
                .with_warehouse("Stores")
                .with_charge("Freight", dec!(1.015)),
        );
        let sle = entry(&receipt, 0, "Stores", dec!(3), dec!(31.01));

        let postings = GlTranslator::translate(
            &receipt,
            &[&sle],
            &StockSettings::default(),
            &accounts,
            &precision,
        );
        assert_eq!(amount_of(&postings, "Freight"), dec!(-1.02));
        assert_eq!(amount_of(&postings, "Stock Adjustment"), dec!(0.01));
        assert_eq!(total(&postings), Decimal::ZERO);
    }

    #[test]
    fn test_return_difference_goes_to_adjustment() {
        let accounts = AccountDefaults::default();
        let precision = Precision::default();
        let mut ret = Voucher::purchase_receipt(at())
            .with_line(VoucherLine::new("A", dec!(-2), dec!(50)).with_warehouse("Stores"));
        ret.is_return = true;
        let sle = entry(&ret, 0, "Stores", dec!(-2), dec!(-110));

        let postings =
            GlTranslator::translate(&ret, &[&sle], &StockSettings::default(), &accounts, &precision);
        assert_eq!(amount_of(&postings, "Stock In Hand"), dec!(-110));
        assert_eq!(amount_of(&postings, "Stock Received But Not Billed"), dec!(100));
        assert_eq!(amount_of(&postings, "Stock Adjustment"), dec!(10));
        assert_eq!(total(&postings), Decimal::ZERO);
    }

    #[test]
    fn test_delivery_posts_cost_of_goods_sold() {
        let accounts = AccountDefaults::default();
        let delivery = Voucher::delivery_note(at())
            .with_line(VoucherLine::new("A", dec!(2), dec!(0)).with_warehouse("Stores"));
        let sle = entry(&delivery, 0, "Stores", dec!(-2), dec!(-90));

        let postings = GlTranslator::translate(
            &delivery,
            &[&sle],
            &StockSettings::default(),
            &accounts,
            &Precision::default(),
        );
        assert_eq!(amount_of(&postings, "Cost of Goods Sold"), dec!(90));
        assert_eq!(amount_of(&postings, "Stock In Hand"), dec!(-90));
        assert_eq!(postings.len(), 2);
    }

    #[test]
    fn test_transfer_uses_inventory_accounts_only() {
        let mut accounts = AccountDefaults::default();
        accounts
            .warehouse_accounts
            .insert(WarehouseCode::from("Shop"), AccountCode::from("Stock - Shop"));
        let transfer = Voucher::stock_transfer(at()).with_line(
            VoucherLine::new("A", dec!(2), dec!(0))
                .with_warehouse("Stores")
                .with_target_warehouse("Shop"),
        );
        let out = entry(&transfer, 0, "Stores", dec!(-2), dec!(-400));
        let inward = entry(&transfer, 0, "Shop", dec!(2), dec!(400));

        let postings = GlTranslator::translate(
            &transfer,
            &[&out, &inward],
            &StockSettings::default(),
            &accounts,
            &Precision::default(),
        );
        assert_eq!(amount_of(&postings, "Stock - Shop"), dec!(400));
        assert_eq!(amount_of(&postings, "Stock In Hand"), dec!(-400));
        assert_eq!(postings.len(), 2);
    }

    #[test]
    fn test_invoice_clears_srbnb() {
        let accounts = AccountDefaults::default();
        let mut invoice = Voucher::new(VoucherType::PurchaseInvoice, at())
            .with_line(VoucherLine::new("A", dec!(5), dec!(50)));
        invoice.against = Some(kardex_shared::types::VoucherId::new());

        let postings = GlTranslator::translate(
            &invoice,
            &[],
            &StockSettings::default(),
            &accounts,
            &Precision::default(),
        );
        assert_eq!(amount_of(&postings, "Stock Received But Not Billed"), dec!(250));
        assert_eq!(amount_of(&postings, "Creditors"), dec!(-250));
    }

    #[test]
    fn test_no_gl_without_perpetual_inventory() {
        let settings = StockSettings {
            perpetual_inventory: false,
            ..StockSettings::default()
        };
        let receipt = Voucher::purchase_receipt(at())
            .with_line(VoucherLine::new("A", dec!(5), dec!(50)).with_warehouse("Stores"));
        let sle = entry(&receipt, 0, "Stores", dec!(5), dec!(250));
        let postings = GlTranslator::translate(
            &receipt,
            &[&sle],
            &settings,
            &AccountDefaults::default(),
            &Precision::default(),
        );
        assert!(postings.is_empty());
    }
}
