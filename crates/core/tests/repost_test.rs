//! Backdated postings, landed costs and deferred reposting.
//!
//! These tests verify that:
//! - A backdated receipt revalues every later outgoing entry
//! - The final ledger does not depend on the order vouchers were submitted in
//! - Landed costs flow through transfers into the target warehouse
//! - Deferred mode leaves pending work that reads either refuse or drain,
//!   including in warehouses fed by transfers
//! - Charges finer than the currency still post balanced GL

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, NaiveDateTime};
use kardex_core::ledger::TrialBalance;
use kardex_core::stock::{BinKey, StockError};
use kardex_core::voucher::{AllocationBasis, LandedCharge, Voucher, VoucherLine};
use kardex_core::{InventoryService, Item};
use kardex_shared::types::{AccountCode, ItemCode, WarehouseCode};
use kardex_shared::{AppConfig, RepostMode, ValuationMethod};
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn receipt(day: u32, qty: Decimal, rate: Decimal) -> Voucher {
    Voucher::purchase_receipt(at(day)).with_line(VoucherLine::new("A", qty, rate).with_warehouse("Stores"))
}

fn issue(day: u32, qty: Decimal) -> Voucher {
    Voucher::material_issue(at(day)).with_line(VoucherLine::new("A", qty, Decimal::ZERO).with_warehouse("Stores"))
}

fn stores() -> (ItemCode, WarehouseCode) {
    (ItemCode::from("A"), WarehouseCode::from("Stores"))
}

#[fixture]
fn service() -> InventoryService {
    InventoryService::new(&AppConfig::default())
}

#[fixture]
fn deferred() -> InventoryService {
    let mut config = AppConfig::default();
    config.stock.repost_mode = RepostMode::Deferred;
    InventoryService::new(&config)
}

#[rstest]
fn test_backdated_receipt_revalues_later_issue(service: InventoryService) {
    service.submit_transaction(receipt(5, dec!(10), dec!(100))).unwrap();
    let issued = service.submit_transaction(issue(6, dec!(5))).unwrap().voucher_id;
    assert_eq!(
        service.stock_entries(issued).unwrap()[0].stock_value_difference,
        dec!(-500)
    );

    let outcome = service.submit_transaction(receipt(3, dec!(10), dec!(200))).unwrap();
    assert!(outcome.repost.touched_vouchers.contains(&issued));

    let entry = &service.stock_entries(issued).unwrap()[0];
    assert_eq!(entry.stock_value_difference, dec!(-1000));
    assert_eq!(entry.outgoing_rate, dec!(200));

    // The issue's GL was corrected, not rewritten.
    let gl = service.gl_entries(issued).unwrap();
    assert_eq!(gl.len(), 4);
    let trial = TrialBalance::from_entries(&gl);
    assert!(trial.is_balanced());
    assert_eq!(trial.balance_of(&AccountCode::from("Cost of Goods Sold")), dec!(1000));
    assert_eq!(trial.balance_of(&AccountCode::from("Stock In Hand")), dec!(-1000));

    let (item, warehouse) = stores();
    let balance = service.get_valuation(&item, &warehouse).unwrap();
    assert_eq!(balance.qty, dec!(15));
    assert_eq!(balance.value, dec!(2000));
    assert_eq!(
        service.trial_balance().unwrap().balance_of(&AccountCode::from("Stock In Hand")),
        balance.value
    );
}

#[rstest]
#[case(ValuationMethod::Fifo)]
#[case(ValuationMethod::MovingAverage)]
fn test_submission_order_does_not_matter(#[case] method: ValuationMethod) {
    let chronological = InventoryService::new(&AppConfig::default());
    let shuffled = InventoryService::new(&AppConfig::default());
    for service in [&chronological, &shuffled] {
        service
            .register_item(Item::new("A").with_valuation_method(method))
            .unwrap();
    }

    chronological.submit_transaction(receipt(1, dec!(10), dec!(10))).unwrap();
    chronological.submit_transaction(receipt(3, dec!(10), dec!(30))).unwrap();
    chronological.submit_transaction(issue(4, dec!(6))).unwrap();

    shuffled.submit_transaction(receipt(3, dec!(10), dec!(30))).unwrap();
    shuffled.submit_transaction(issue(4, dec!(6))).unwrap();
    shuffled.submit_transaction(receipt(1, dec!(10), dec!(10))).unwrap();

    let (item, warehouse) = stores();
    let expected: Vec<(Decimal, Decimal)> = chronological
        .bin_entries(&item, &warehouse)
        .unwrap()
        .iter()
        .map(|entry| (entry.qty_after_transaction, entry.stock_value))
        .collect();
    let actual: Vec<(Decimal, Decimal)> = shuffled
        .bin_entries(&item, &warehouse)
        .unwrap()
        .iter()
        .map(|entry| (entry.qty_after_transaction, entry.stock_value))
        .collect();
    assert_eq!(expected, actual);

    // Corrections change debit and credit totals, never the balances.
    let balances = |service: &InventoryService| -> Vec<(AccountCode, Decimal)> {
        service
            .trial_balance()
            .unwrap()
            .accounts()
            .map(|account| (account.account.clone(), account.balance))
            .collect()
    };
    assert_eq!(balances(&chronological), balances(&shuffled));
}

#[rstest]
fn test_cancelling_backdated_receipt_restores_later_rates(service: InventoryService) {
    service.submit_transaction(receipt(5, dec!(10), dec!(100))).unwrap();
    let issued = service.submit_transaction(issue(6, dec!(5))).unwrap().voucher_id;
    let backdated = service.submit_transaction(receipt(3, dec!(10), dec!(200))).unwrap().voucher_id;

    let outcome = service.cancel_transaction(backdated).unwrap();
    assert!(outcome.repost.touched_vouchers.contains(&issued));
    assert_eq!(
        service.stock_entries(issued).unwrap()[0].stock_value_difference,
        dec!(-500)
    );

    let trial = TrialBalance::from_entries(&service.gl_entries(issued).unwrap());
    assert_eq!(trial.balance_of(&AccountCode::from("Cost of Goods Sold")), dec!(500));
    assert!(service.trial_balance().unwrap().is_balanced());
}

#[rstest]
fn test_landed_cost_flows_through_transfer() {
    let mut config = AppConfig::default();
    config
        .accounts
        .warehouse_accounts
        .insert(WarehouseCode::from("Shop"), AccountCode::from("Shop Stock"));
    let service = InventoryService::new(&config);

    let received = service.submit_transaction(receipt(1, dec!(10), dec!(100))).unwrap().voucher_id;
    let transfer = Voucher::stock_transfer(at(2)).with_line(
        VoucherLine::new("A", dec!(10), Decimal::ZERO)
            .with_warehouse("Stores")
            .with_target_warehouse("Shop"),
    );
    let moved = service.submit_transaction(transfer).unwrap().voucher_id;

    let report = service
        .apply_landed_cost(
            received,
            &[LandedCharge::new("Freight", dec!(100))],
            AllocationBasis::Amount,
        )
        .unwrap();
    assert!(report.touched_vouchers.contains(&moved));
    assert!(report.touched_bins.contains(&BinKey::new("A", "Shop")));

    let shop = service
        .get_valuation(&ItemCode::from("A"), &WarehouseCode::from("Shop"))
        .unwrap();
    assert_eq!(shop.qty, dec!(10));
    assert_eq!(shop.value, dec!(1100));
    assert_eq!(shop.rate, dec!(110));

    let trial = service.trial_balance().unwrap();
    assert!(trial.is_balanced());
    assert_eq!(trial.balance_of(&AccountCode::from("Shop Stock")), dec!(1100));
    assert_eq!(trial.balance_of(&AccountCode::from("Stock In Hand")), Decimal::ZERO);
    assert_eq!(trial.balance_of(&AccountCode::from("Freight")), dec!(-100));
    assert_eq!(
        trial.balance_of(&AccountCode::from("Stock Received But Not Billed")),
        dec!(-1000)
    );
}

#[rstest]
fn test_landed_cost_rejects_issues(service: InventoryService) {
    service.submit_transaction(receipt(1, dec!(10), dec!(100))).unwrap();
    let issued = service.submit_transaction(issue(2, dec!(1))).unwrap().voucher_id;

    let err = service
        .apply_landed_cost(issued, &[LandedCharge::new("Freight", dec!(10))], AllocationBasis::Qty)
        .unwrap_err();
    assert!(matches!(err, StockError::Validation(_)));
}

#[rstest]
fn test_deferred_mode_leaves_pending_work(deferred: InventoryService) {
    deferred.submit_transaction(receipt(5, dec!(10), dec!(100))).unwrap();
    let issued = deferred.submit_transaction(issue(6, dec!(5))).unwrap().voucher_id;
    let outcome = deferred.submit_transaction(receipt(3, dec!(10), dec!(200))).unwrap();
    assert_eq!(outcome.pending_reposts, 1);

    let (item, warehouse) = stores();
    let pending = deferred.pending_reposts().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, BinKey::new("A", "Stores"));

    let err = deferred.try_valuation(&item, &warehouse).unwrap_err();
    assert!(matches!(err, StockError::RepostPending { .. }));
    // Before the pending range the balance is already final.
    let early = deferred.compute_rate(&item, &warehouse, at(4)).unwrap();
    assert_eq!(early.value, dec!(2000));

    let balance = deferred.get_valuation(&item, &warehouse).unwrap();
    assert_eq!(balance.qty, dec!(15));
    assert_eq!(balance.value, dec!(2000));
    assert!(deferred.pending_reposts().unwrap().is_empty());
    assert_eq!(
        deferred.stock_entries(issued).unwrap()[0].stock_value_difference,
        dec!(-1000)
    );
    assert!(deferred.trial_balance().unwrap().is_balanced());
}

#[rstest]
fn test_explicit_repost_is_idempotent(service: InventoryService) {
    service.submit_transaction(receipt(1, dec!(10), dec!(10))).unwrap();
    service.submit_transaction(issue(2, dec!(3))).unwrap();

    let report = service.repost_from(&BinKey::new("A", "Stores"), at(1)).unwrap();
    assert_eq!(report.entries_rewritten, 0);
    assert!(report.touched_bins.contains(&BinKey::new("A", "Stores")));
}

#[rstest]
fn test_deferred_mode_marks_transfer_targets_pending(deferred: InventoryService) {
    deferred.submit_transaction(receipt(3, dec!(5), dec!(100))).unwrap();
    let transfer = Voucher::stock_transfer(at(4)).with_line(
        VoucherLine::new("A", dec!(5), Decimal::ZERO)
            .with_warehouse("Stores")
            .with_target_warehouse("Shop"),
    );
    deferred.submit_transaction(transfer).unwrap();
    let (item, shop) = (ItemCode::from("A"), WarehouseCode::from("Shop"));
    assert_eq!(deferred.try_valuation(&item, &shop).unwrap().value, dec!(500));

    let backdated = deferred.submit_transaction(receipt(1, dec!(5), dec!(200))).unwrap();
    assert_eq!(backdated.pending_reposts, 2);
    let pending: Vec<BinKey> = deferred
        .pending_reposts()
        .unwrap()
        .into_iter()
        .map(|item| item.key)
        .collect();
    assert!(pending.contains(&BinKey::new("A", "Shop")));

    let err = deferred.try_valuation(&item, &shop).unwrap_err();
    assert!(matches!(err, StockError::RepostPending { .. }));
    let err = deferred.compute_rate(&item, &shop, at(10)).unwrap_err();
    assert!(matches!(err, StockError::RepostPending { .. }));
    assert_eq!(deferred.compute_rate(&item, &shop, at(2)).unwrap().qty, Decimal::ZERO);

    let balance = deferred.get_valuation(&item, &shop).unwrap();
    assert_eq!(balance.qty, dec!(5));
    assert_eq!(balance.value, dec!(1000));
    assert!(deferred.trial_balance().unwrap().is_balanced());

    // Cancelling the backdated receipt marks the target again.
    deferred.cancel_transaction(backdated.voucher_id).unwrap();
    assert!(matches!(
        deferred.try_valuation(&item, &shop),
        Err(StockError::RepostPending { .. })
    ));
    assert_eq!(deferred.get_valuation(&item, &shop).unwrap().value, dec!(500));
}

#[rstest]
#[case::line_charge(
    Voucher::purchase_receipt(at(1)).with_line(
        VoucherLine::new("A", dec!(3), dec!(10))
            .with_warehouse("Stores")
            .with_charge("Freight", dec!(1.015)),
    )
)]
#[case::voucher_charge(
    Voucher::purchase_receipt(at(1))
        .with_line(VoucherLine::new("A", dec!(3), dec!(10)).with_warehouse("Stores"))
        .with_charge("Freight", dec!(1.015), AllocationBasis::Amount)
)]
fn test_sub_cent_charge_posts_balanced_gl(service: InventoryService, #[case] voucher: Voucher) {
    let id = service.submit_transaction(voucher).unwrap().voucher_id;

    let trial = TrialBalance::from_entries(&service.gl_entries(id).unwrap());
    assert!(trial.is_balanced());
    assert_eq!(trial.balance_of(&AccountCode::from("Freight")), dec!(-1.02));
    assert_eq!(
        trial.balance_of(&AccountCode::from("Stock Received But Not Billed")),
        dec!(-30)
    );
    let (item, warehouse) = stores();
    assert_eq!(
        trial.balance_of(&AccountCode::from("Stock In Hand")),
        service.get_valuation(&item, &warehouse).unwrap().value
    );
}
