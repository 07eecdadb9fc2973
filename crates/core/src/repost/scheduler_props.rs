//! Property tests for reposting.

use chrono::{NaiveDate, NaiveDateTime};
use kardex_shared::types::{ItemCode, Precision, VoucherId, VoucherLineId, WarehouseCode};
use kardex_shared::{StockSettings, ValuationMethod};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::{ChainVerifier, RepostQueue, RepostScheduler};
use crate::stock::{BinKey, LedgerStore, NewStockEntry, RateSource};
use crate::valuation::{BinSnapshot, ValuationEngine};
use crate::voucher::VoucherType;

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i64::from(day))
}

/// A receipt on a given day; days are made distinct by the strategy.
fn draft(day: u32, qty: Decimal, rate: Decimal) -> NewStockEntry {
    NewStockEntry {
        item: ItemCode::from("A"),
        warehouse: WarehouseCode::from("Stores"),
        voucher_type: VoucherType::MaterialReceipt,
        voucher_id: VoucherId::new(),
        voucher_line_id: VoucherLineId::new(),
        posted_at: at(day),
        actual_qty: qty,
        rate_source: RateSource::Explicit(rate),
        allow_zero_valuation_rate: false,
    }
}

fn arb_receipts() -> impl Strategy<Value = Vec<(u32, Decimal, Decimal)>> {
    prop::collection::vec(
        ((1i64..50).prop_map(|n| Decimal::new(n, 0)), (1i64..100_000).prop_map(|n| Decimal::new(n, 2))),
        1..8,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .enumerate()
            .map(|(day, (qty, rate))| (u32::try_from(day).unwrap_or(0) * 2, qty, rate))
            .collect()
    })
}

fn arb_method() -> impl Strategy<Value = ValuationMethod> {
    prop_oneof![Just(ValuationMethod::Fifo), Just(ValuationMethod::MovingAverage)]
}

fn replay(
    receipts: &[(u32, Decimal, Decimal)],
    order: &[usize],
    method: ValuationMethod,
    issue: Decimal,
) -> (BinSnapshot, LedgerStore) {
    let engine = ValuationEngine::new(&StockSettings::default(), Precision::default());
    let methods = move |_: &ItemCode| method;
    let scheduler = RepostScheduler::new(&engine, &methods, 64);
    let mut store = LedgerStore::new();
    let mut queue = RepostQueue::new();

    for index in order {
        let (day, qty, rate) = receipts[*index];
        let id = store.append(draft(day, qty, rate)).unwrap();
        let entry = store.get(id).unwrap();
        queue.push(entry.key(), entry.posting);
        scheduler.run(&mut store, &mut queue).unwrap();
    }

    if !issue.is_zero() {
        let last_day = receipts.iter().map(|(day, _, _)| *day).max().unwrap_or(0);
        let mut issue_draft = draft(last_day + 1, -issue, Decimal::ZERO);
        issue_draft.rate_source = RateSource::Valuation;
        let id = store.append(issue_draft).unwrap();
        let entry = store.get(id).unwrap();
        queue.push(entry.key(), entry.posting);
        scheduler.run(&mut store, &mut queue).unwrap();
    }
    (store.balance(&BinKey::new("A", "Stores")), store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Inserting receipts in any order ends in the same bin balance.
    #[test]
    fn prop_insertion_order_independent(
        receipts in arb_receipts(),
        method in arb_method(),
        seed in any::<u64>(),
    ) {
        let chronological: Vec<usize> = (0..receipts.len()).collect();
        let mut shuffled = chronological.clone();
        // Deterministic shuffle driven by the seed.
        let mut state = seed;
        for i in (1..shuffled.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let bound = u64::try_from(i + 1).unwrap_or(1);
            let j = usize::try_from(state % bound).unwrap_or(0);
            shuffled.swap(i, j);
        }
        let issue = receipts[0].1;

        let (expected, _) = replay(&receipts, &chronological, method, issue);
        let (actual, store) = replay(&receipts, &shuffled, method, issue);
        prop_assert_eq!(expected, actual);

        let engine = ValuationEngine::new(&StockSettings::default(), Precision::default());
        let methods = move |_: &ItemCode| method;
        prop_assert!(ChainVerifier::verify(&store, &engine, &methods, &[BinKey::new("A", "Stores")]).is_ok());
    }

    /// A second run over an already reposted bin rewrites nothing.
    #[test]
    fn prop_repost_idempotent(receipts in arb_receipts(), method in arb_method()) {
        let order: Vec<usize> = (0..receipts.len()).collect();
        let (_, mut store) = replay(&receipts, &order, method, Decimal::ZERO);
        let engine = ValuationEngine::new(&StockSettings::default(), Precision::default());
        let methods = move |_: &ItemCode| method;
        let scheduler = RepostScheduler::new(&engine, &methods, 64);
        let mut queue = RepostQueue::new();
        queue.push(BinKey::new("A", "Stores"), crate::stock::PostingKey::start_of(at(0)));
        let report = scheduler.run(&mut store, &mut queue).unwrap();
        prop_assert_eq!(report.entries_rewritten, 0);
    }
}
