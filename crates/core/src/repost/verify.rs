//! Replay check of reposted chains.

use rayon::prelude::*;

use super::scheduler::{MethodLookup, RepostScheduler};
use crate::stock::{BinKey, LedgerStore, StockError, StockLedgerEntry, StockResult};
use crate::valuation::{BinState, Valuation, ValuationEngine};

/// Replays bins from an empty state and compares with stored values.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verifies every bin in `bins` in parallel.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` naming the first mismatching entry found, or
    /// the valuation error the replay ran into.
    pub fn verify(
        store: &LedgerStore,
        engine: &ValuationEngine,
        methods: MethodLookup<'_>,
        bins: &[BinKey],
    ) -> StockResult<()> {
        bins.par_iter()
            .try_for_each(|key| Self::verify_bin(store, engine, methods, key))
    }

    fn verify_bin(
        store: &LedgerStore,
        engine: &ValuationEngine,
        methods: MethodLookup<'_>,
        key: &BinKey,
    ) -> StockResult<()> {
        let method = methods(&key.item);
        let mut state = BinState::default();
        for entry in store.bin_entries(key) {
            let movement = RepostScheduler::movement_for(store, entry, &state)?;
            let valuation = engine.apply(key, entry.posting.posted_at, method, &state, &movement)?;
            if !matches_stored(entry, &valuation) {
                return Err(StockError::Consistency(format!(
                    "stored valuation of entry {} in {key} differs from replay",
                    entry.id
                )));
            }
            state = valuation.state;
        }
        Ok(())
    }
}

fn matches_stored(entry: &StockLedgerEntry, valuation: &Valuation) -> bool {
    entry.qty_after_transaction == valuation.state.qty
        && entry.stock_value == valuation.state.value
        && entry.valuation_rate == valuation.state.rate
        && entry.stock_value_difference == valuation.stock_value_difference
        && entry.incoming_rate == valuation.incoming_rate
        && entry.outgoing_rate == valuation.outgoing_rate
}
