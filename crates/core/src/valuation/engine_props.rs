//! Property-based tests for the valuation engine.

use chrono::NaiveDate;
use kardex_shared::types::Precision;
use kardex_shared::{StockSettings, ValuationMethod};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::engine::{BinState, ValuationEngine};
use super::method::{Movement, MovementRate};
use crate::stock::BinKey;

fn arb_qty() -> impl Strategy<Value = Decimal> {
    (1i64..500i64).prop_map(Decimal::from)
}

fn arb_rate() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Receipts and issues; issues use the bin valuation.
fn arb_movements() -> impl Strategy<Value = Vec<Movement>> {
    prop::collection::vec(
        (arb_qty(), arb_rate(), any::<bool>()).prop_map(|(qty, rate, incoming)| {
            if incoming {
                Movement {
                    qty,
                    rate: MovementRate::Incoming(rate),
                    allow_zero_valuation_rate: false,
                }
            } else {
                Movement {
                    qty: -qty,
                    rate: MovementRate::OutgoingAtValuation,
                    allow_zero_valuation_rate: false,
                }
            }
        }),
        1..40,
    )
}

fn arb_method() -> impl Strategy<Value = ValuationMethod> {
    prop_oneof![
        Just(ValuationMethod::Fifo),
        Just(ValuationMethod::MovingAverage)
    ]
}

fn permissive_engine() -> ValuationEngine {
    let settings = StockSettings {
        allow_negative_stock: true,
        ..StockSettings::default()
    };
    ValuationEngine::new(&settings, Precision::default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Stock value differences telescope to the final stock value.
    #[test]
    fn prop_value_differences_sum_to_stock_value(
        method in arb_method(),
        movements in arb_movements(),
    ) {
        let engine = permissive_engine();
        let key = BinKey::new("P", "W");
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut state = BinState::default();
        let mut total = Decimal::ZERO;
        for movement in &movements {
            let valuation = engine.apply(&key, at, method, &state, movement).unwrap();
            total += valuation.stock_value_difference;
            state = valuation.state;
        }
        prop_assert_eq!(total, state.value);
    }

    /// The FIFO queue always holds exactly the bin quantity.
    #[test]
    fn prop_fifo_queue_tracks_qty(movements in arb_movements()) {
        let engine = permissive_engine();
        let key = BinKey::new("P", "W");
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut state = BinState::default();
        for movement in &movements {
            state = engine
                .apply(&key, at, ValuationMethod::Fifo, &state, movement)
                .unwrap()
                .state;
            prop_assert_eq!(state.queue.total_qty(), state.qty);
        }
    }

    /// A bin at zero quantity carries zero value.
    #[test]
    fn prop_empty_bin_has_no_value(
        method in arb_method(),
        qty in arb_qty(),
        rate in arb_rate(),
    ) {
        let engine = permissive_engine();
        let key = BinKey::new("P", "W");
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let received = engine
            .apply(&key, at, method, &BinState::default(), &Movement {
                qty,
                rate: MovementRate::Incoming(rate),
                allow_zero_valuation_rate: false,
            })
            .unwrap();
        let issued = engine
            .apply(&key, at, method, &received.state, &Movement {
                qty: -qty,
                rate: MovementRate::OutgoingAtValuation,
                allow_zero_valuation_rate: false,
            })
            .unwrap();
        prop_assert!(issued.state.qty.is_zero());
        prop_assert!(issued.state.value.is_zero());
        prop_assert_eq!(issued.stock_value_difference, -received.stock_value_difference);
    }
}
