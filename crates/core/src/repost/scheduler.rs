//! Repost scheduler.
//!
//! Recomputes stock ledger entries after an out-of-order insertion or a
//! cancellation. Every work item walks one bin forwards from a posting,
//! starting from the state stored on the entry right before it. Entries whose
//! stored values change pull the entries that derive their rate from them
//! into the queue, so corrections flow across warehouses.

use std::collections::{BTreeSet, HashMap};

use kardex_shared::ValuationMethod;
use kardex_shared::types::{ItemCode, StockEntryId, VoucherId};
use rust_decimal::Decimal;
use serde::Serialize;

use super::queue::RepostQueue;
use crate::stock::{BinKey, LedgerStore, RateSource, StockError, StockLedgerEntry, StockResult};
use crate::valuation::{BinState, Movement, MovementRate, ValuationEngine};

/// Valuation method lookup per item.
pub type MethodLookup<'a> = &'a (dyn Fn(&ItemCode) -> ValuationMethod + Sync);

/// What a repost run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepostReport {
    /// Bins that were recomputed.
    pub touched_bins: BTreeSet<BinKey>,
    /// Vouchers with at least one entry whose stored values changed.
    pub touched_vouchers: BTreeSet<VoucherId>,
    /// Entries whose stored values changed.
    pub entries_rewritten: usize,
    /// Work items processed.
    pub passes: usize,
}

impl RepostReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.touched_bins.extend(other.touched_bins);
        self.touched_vouchers.extend(other.touched_vouchers);
        self.entries_rewritten += other.entries_rewritten;
        self.passes += other.passes;
    }
}

/// Drains a [`RepostQueue`] against a [`LedgerStore`].
pub struct RepostScheduler<'a> {
    engine: &'a ValuationEngine,
    methods: MethodLookup<'a>,
    max_passes: usize,
}

impl<'a> RepostScheduler<'a> {
    /// Creates a scheduler.
    ///
    /// `max_passes` bounds how often a single bin may be recomputed in one
    /// run.
    #[must_use]
    pub fn new(engine: &'a ValuationEngine, methods: MethodLookup<'a>, max_passes: usize) -> Self {
        Self {
            engine,
            methods,
            max_passes,
        }
    }

    /// Processes queued work until the queue is empty.
    ///
    /// # Errors
    ///
    /// - Valuation errors (`NegativeStock`, `ZeroValuationRate`) of any
    ///   recomputed entry
    /// - `Consistency` if a bin does not settle within the pass limit
    pub fn run(&self, store: &mut LedgerStore, queue: &mut RepostQueue) -> StockResult<RepostReport> {
        let mut report = RepostReport::default();
        let mut passes: HashMap<BinKey, usize> = HashMap::new();

        while let Some(item) = queue.pop() {
            let count = passes.entry(item.key.clone()).or_default();
            *count += 1;
            if *count > self.max_passes {
                return Err(StockError::Consistency(format!(
                    "repost of {} did not settle after {} passes",
                    item.key, self.max_passes
                )));
            }
            tracing::trace!(bin = %item.key, from = %item.from.posted_at, "reposting bin");
            self.repost_bin(store, &item.key, item.from, queue, &mut report)?;
            report.passes += 1;
        }
        Ok(report)
    }

    /// Values freshly appended entries without touching later ones.
    ///
    /// Each bin that has entries after a valued one is queued from there,
    /// together with the bins those later entries feed.
    ///
    /// # Errors
    ///
    /// Returns valuation errors of the valued entries.
    pub fn value_entries(
        &self,
        store: &mut LedgerStore,
        ids: &[StockEntryId],
        queue: &mut RepostQueue,
    ) -> StockResult<RepostReport> {
        let mut report = RepostReport::default();
        let mut ordered: Vec<&StockLedgerEntry> = ids.iter().filter_map(|id| store.get(*id)).collect();
        ordered.sort_by_key(|entry| entry.posting);
        let ordered: Vec<(StockEntryId, BinKey)> =
            ordered.into_iter().map(|entry| (entry.id, entry.key())).collect();

        for (id, key) in ordered {
            let entry = entry_of(store, id)?;
            let prev = store
                .previous_entry(&key, entry.posting)
                .map(StockLedgerEntry::state_after)
                .unwrap_or_default();
            let posting = entry.posting;
            let voucher = entry.voucher_id;
            let movement = Self::movement_for(store, entry, &prev)?;
            let valuation =
                self.engine
                    .apply(&key, posting.posted_at, (self.methods)(&key.item), &prev, &movement)?;
            if store.write_valuation(id, valuation)? {
                report.entries_rewritten += 1;
            }
            report.touched_vouchers.insert(voucher);

            if let Some(next) = store.entries_after(&key, posting).next().map(|next| next.posting) {
                queue.push_downstream(store, key.clone(), next);
            }
            report.touched_bins.insert(key);
        }
        Ok(report)
    }

    fn repost_bin(
        &self,
        store: &mut LedgerStore,
        key: &BinKey,
        from: crate::stock::PostingKey,
        queue: &mut RepostQueue,
        report: &mut RepostReport,
    ) -> StockResult<()> {
        let method = (self.methods)(&key.item);
        let mut state = store
            .previous_entry(key, from)
            .map(StockLedgerEntry::state_after)
            .unwrap_or_default();
        let ids: Vec<StockEntryId> = store.entries_from(key, from).map(|entry| entry.id).collect();

        for id in ids {
            let entry = entry_of(store, id)?;
            let posting = entry.posting;
            let voucher = entry.voucher_id;
            let movement = Self::movement_for(store, entry, &state)?;
            let valuation = self
                .engine
                .apply(key, posting.posted_at, method, &state, &movement)?;
            state = valuation.state.clone();

            if !store.write_valuation(id, valuation)? {
                continue;
            }
            report.entries_rewritten += 1;
            report.touched_vouchers.insert(voucher);
            for dependent in store.dependents_of(id) {
                if &dependent.key() == key && dependent.posting > posting {
                    continue;
                }
                queue.push(dependent.key(), dependent.posting);
            }
        }
        report.touched_bins.insert(key.clone());
        Ok(())
    }

    /// Derives the movement of `entry` given the bin state before it.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the entry's rate source points at a missing
    /// entry.
    pub fn movement_for(
        store: &LedgerStore,
        entry: &StockLedgerEntry,
        prev: &BinState,
    ) -> StockResult<Movement> {
        let incoming = entry.actual_qty > Decimal::ZERO;
        let rate = match entry.rate_source {
            RateSource::Explicit(rate) if incoming => MovementRate::Incoming(rate),
            RateSource::Explicit(rate) => MovementRate::OutgoingAt(rate),
            RateSource::Valuation if incoming => MovementRate::Incoming(prev.rate),
            RateSource::Valuation => MovementRate::OutgoingAtValuation,
            RateSource::ReturnAgainst(original) => {
                let original = entry_of(store, original)?;
                let rate = if original.is_incoming() {
                    original.incoming_rate
                } else {
                    original.outgoing_rate
                };
                if incoming {
                    MovementRate::Incoming(rate)
                } else {
                    MovementRate::OutgoingAt(rate)
                }
            }
            RateSource::Linked(source) => {
                MovementRate::IncomingValue(-entry_of(store, source)?.stock_value_difference)
            }
        };
        Ok(Movement {
            qty: entry.actual_qty,
            rate,
            allow_zero_valuation_rate: entry.allow_zero_valuation_rate,
        })
    }
}

fn entry_of(store: &LedgerStore, id: StockEntryId) -> StockResult<&StockLedgerEntry> {
    store
        .get(id)
        .ok_or_else(|| StockError::Internal(format!("stock entry {id} not found")))
}
