//! Ledger entry store.
//!
//! Entries are kept per bin in a `BTreeMap` keyed by `PostingKey`, so range
//! reads after any posting are ordered and lazy. Cancelled entries stay in
//! the timeline; readers skip them.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use chrono::NaiveDateTime;
use kardex_shared::types::{StockEntryId, VoucherId};
use rust_decimal::Decimal;

use super::cache::BinCache;
use super::entry::{BinKey, NewStockEntry, PostingKey, RateSource, StockLedgerEntry};
use super::error::{StockError, StockResult};
use crate::valuation::{BinSnapshot, FifoQueue, Valuation};

/// In-memory stock ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    entries: HashMap<StockEntryId, StockLedgerEntry>,
    timelines: HashMap<BinKey, BTreeMap<PostingKey, StockEntryId>>,
    by_voucher: HashMap<VoucherId, Vec<StockEntryId>>,
    dependents: HashMap<StockEntryId, Vec<StockEntryId>>,
    next_sequence: u64,
    cache: BinCache,
}

impl LedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a movement and returns its id.
    ///
    /// The entry is stored with zero valuation; the repost scheduler fills
    /// it in.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` if an active entry already exists for the
    /// same voucher, item, warehouse and line.
    pub fn append(&mut self, draft: NewStockEntry) -> StockResult<StockEntryId> {
        let duplicate = self
            .by_voucher
            .get(&draft.voucher_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .any(|existing| {
                existing.is_active()
                    && existing.voucher_line_id == draft.voucher_line_id
                    && existing.item == draft.item
                    && existing.warehouse == draft.warehouse
            });
        if duplicate {
            return Err(StockError::DuplicateEntry {
                voucher: draft.voucher_id,
                item: draft.item,
                warehouse: draft.warehouse,
                line: draft.voucher_line_id,
            });
        }

        let entry = StockLedgerEntry {
            id: StockEntryId::new(),
            item: draft.item,
            warehouse: draft.warehouse,
            voucher_type: draft.voucher_type,
            voucher_id: draft.voucher_id,
            voucher_line_id: draft.voucher_line_id,
            posting: PostingKey::new(draft.posted_at, self.take_sequence()),
            actual_qty: draft.actual_qty,
            rate_source: draft.rate_source,
            allow_zero_valuation_rate: draft.allow_zero_valuation_rate,
            incoming_rate: Decimal::ZERO,
            outgoing_rate: Decimal::ZERO,
            valuation_rate: Decimal::ZERO,
            qty_after_transaction: Decimal::ZERO,
            stock_value: Decimal::ZERO,
            stock_value_difference: Decimal::ZERO,
            stock_queue: FifoQueue::new(),
            is_cancelled: false,
            is_reversal: false,
        };
        let id = entry.id;
        self.insert(entry);
        Ok(id)
    }

    /// Flags an entry cancelled and records its reversing entry.
    ///
    /// Both drop out of valuation; the caller reposts the bin from the
    /// entry's posting.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the entry does not exist.
    pub fn cancel(&mut self, id: StockEntryId) -> StockResult<StockEntryId> {
        let sequence = self.take_sequence();
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| StockError::Internal(format!("stock entry {id} not found")))?;
        entry.is_cancelled = true;
        let reversal = entry.reversal(StockEntryId::new(), sequence);
        let reversal_id = reversal.id;
        self.insert(reversal);
        Ok(reversal_id)
    }

    /// Writes recomputed valuation into an entry.
    ///
    /// Returns true if any stored value changed.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the entry does not exist.
    pub fn write_valuation(&mut self, id: StockEntryId, valuation: Valuation) -> StockResult<bool> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| StockError::Internal(format!("stock entry {id} not found")))?;

        let changed = entry.incoming_rate != valuation.incoming_rate
            || entry.outgoing_rate != valuation.outgoing_rate
            || entry.valuation_rate != valuation.state.rate
            || entry.qty_after_transaction != valuation.state.qty
            || entry.stock_value != valuation.state.value
            || entry.stock_value_difference != valuation.stock_value_difference
            || entry.stock_queue != valuation.state.queue;

        entry.incoming_rate = valuation.incoming_rate;
        entry.outgoing_rate = valuation.outgoing_rate;
        entry.valuation_rate = valuation.state.rate;
        entry.qty_after_transaction = valuation.state.qty;
        entry.stock_value = valuation.state.value;
        entry.stock_value_difference = valuation.stock_value_difference;
        entry.stock_queue = valuation.state.queue;

        let key = entry.key();
        self.cache.invalidate(&key);
        Ok(changed)
    }

    /// Replaces how an entry derives its rate.
    ///
    /// Only fixed rates may be swapped; linked and return entries keep
    /// following their source.
    ///
    /// # Errors
    ///
    /// - `Internal` if the entry does not exist
    /// - `Validation` if either source is not explicit
    pub fn set_rate_source(&mut self, id: StockEntryId, source: RateSource) -> StockResult<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| StockError::Internal(format!("stock entry {id} not found")))?;
        if !matches!(
            (entry.rate_source, source),
            (RateSource::Explicit(_), RateSource::Explicit(_))
        ) {
            return Err(StockError::Validation(format!(
                "rate of stock entry {id} is derived and cannot be replaced"
            )));
        }
        entry.rate_source = source;
        Ok(())
    }

    /// Returns an entry by id.
    #[must_use]
    pub fn get(&self, id: StockEntryId) -> Option<&StockLedgerEntry> {
        self.entries.get(&id)
    }

    /// Active entries of a bin strictly after `after`, in posting order.
    pub fn entries_after<'a>(
        &'a self,
        key: &BinKey,
        after: PostingKey,
    ) -> impl Iterator<Item = &'a StockLedgerEntry> + 'a {
        self.range(key, (Bound::Excluded(after), Bound::Unbounded))
    }

    /// Active entries of a bin at or after `from`, in posting order.
    pub fn entries_from<'a>(
        &'a self,
        key: &BinKey,
        from: PostingKey,
    ) -> impl Iterator<Item = &'a StockLedgerEntry> + 'a {
        self.range(key, (Bound::Included(from), Bound::Unbounded))
    }

    /// All active entries of a bin, in posting order.
    pub fn bin_entries<'a>(&'a self, key: &BinKey) -> impl Iterator<Item = &'a StockLedgerEntry> + 'a {
        self.range(key, (Bound::Unbounded, Bound::Unbounded))
    }

    /// The last active entry of a bin strictly before `before`.
    #[must_use]
    pub fn previous_entry(&self, key: &BinKey, before: PostingKey) -> Option<&StockLedgerEntry> {
        self.timelines.get(key).and_then(|timeline| {
            timeline
                .range(..before)
                .rev()
                .filter_map(|(_, id)| self.entries.get(id))
                .find(|entry| entry.is_active())
        })
    }

    /// All entries of a voucher, active and cancelled, in posting order.
    #[must_use]
    pub fn entries_for_voucher(&self, voucher: VoucherId) -> Vec<&StockLedgerEntry> {
        let mut entries: Vec<_> = self
            .by_voucher
            .get(&voucher)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .collect();
        entries.sort_by_key(|entry| entry.posting);
        entries
    }

    /// Active entries whose rate derives from entry `id`.
    pub fn dependents_of(&self, id: StockEntryId) -> impl Iterator<Item = &StockLedgerEntry> {
        self.dependents
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(move |dependent| self.entries.get(dependent))
            .filter(|entry| entry.is_active())
    }

    /// Every bin that has at least one entry.
    pub fn bins(&self) -> impl Iterator<Item = &BinKey> {
        self.timelines.keys()
    }

    /// Every entry in the store.
    pub fn entries(&self) -> impl Iterator<Item = &StockLedgerEntry> {
        self.entries.values()
    }

    /// Latest balance of a bin.
    #[must_use]
    pub fn balance(&self, key: &BinKey) -> BinSnapshot {
        self.cache.get_or_compute(key, || {
            self.timelines
                .get(key)
                .and_then(|timeline| {
                    timeline
                        .values()
                        .rev()
                        .filter_map(|id| self.entries.get(id))
                        .find(|entry| entry.is_active())
                })
                .map(|entry| BinSnapshot::from(&entry.state_after()))
                .unwrap_or_default()
        })
    }

    /// Balance of a bin including every movement posted at or before `as_of`.
    #[must_use]
    pub fn balance_at(&self, key: &BinKey, as_of: NaiveDateTime) -> BinSnapshot {
        self.previous_entry(key, PostingKey::new(as_of, u64::MAX))
            .map(|entry| BinSnapshot::from(&entry.state_after()))
            .unwrap_or_default()
    }

    /// Reserves the next insertion sequence.
    pub fn take_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn range<'a>(
        &'a self,
        key: &BinKey,
        bounds: (Bound<PostingKey>, Bound<PostingKey>),
    ) -> impl Iterator<Item = &'a StockLedgerEntry> + 'a {
        self.timelines
            .get(key)
            .into_iter()
            .flat_map(move |timeline| timeline.range(bounds))
            .filter_map(move |(_, id)| self.entries.get(id))
            .filter(|entry| entry.is_active())
    }

    fn insert(&mut self, entry: StockLedgerEntry) {
        let key = entry.key();
        self.timelines
            .entry(key.clone())
            .or_default()
            .insert(entry.posting, entry.id);
        self.by_voucher
            .entry(entry.voucher_id)
            .or_default()
            .push(entry.id);
        if let Some(dependency) = entry.rate_source.depends_on()
            && !entry.is_reversal
        {
            self.dependents.entry(dependency).or_default().push(entry.id);
        }
        self.entries.insert(entry.id, entry);
        self.cache.invalidate(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::VoucherType;
    use chrono::NaiveDate;
    use kardex_shared::types::{ItemCode, VoucherLineId, WarehouseCode};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn draft(voucher: VoucherId, day: u32, qty: Decimal) -> NewStockEntry {
        NewStockEntry {
            item: ItemCode::from("A"),
            warehouse: WarehouseCode::from("Stores"),
            voucher_type: VoucherType::MaterialReceipt,
            voucher_id: voucher,
            voucher_line_id: VoucherLineId::new(),
            posted_at: at(day),
            actual_qty: qty,
            rate_source: RateSource::Explicit(dec!(10)),
            allow_zero_valuation_rate: false,
        }
    }

    #[test]
    fn test_entries_ordered_by_posting_then_sequence() {
        let mut store = LedgerStore::new();
        let late = store.append(draft(VoucherId::new(), 5, dec!(1))).unwrap();
        let early = store.append(draft(VoucherId::new(), 2, dec!(1))).unwrap();
        let same_day = store.append(draft(VoucherId::new(), 5, dec!(1))).unwrap();

        let key = BinKey::new("A", "Stores");
        let ids: Vec<_> = store.bin_entries(&key).map(|e| e.id).collect();
        assert_eq!(ids, vec![early, late, same_day]);

        let early_key = store.get(early).unwrap().posting;
        let after: Vec<_> = store.entries_after(&key, early_key).map(|e| e.id).collect();
        assert_eq!(after, vec![late, same_day]);

        let previous = store.previous_entry(&key, store.get(same_day).unwrap().posting);
        assert_eq!(previous.map(|e| e.id), Some(late));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut store = LedgerStore::new();
        let entry = draft(VoucherId::new(), 1, dec!(1));
        store.append(entry.clone()).unwrap();
        let err = store.append(entry).unwrap_err();
        assert!(matches!(err, StockError::DuplicateEntry { .. }));
    }

    #[test]
    fn test_cancel_hides_entry_and_records_reversal() {
        let mut store = LedgerStore::new();
        let voucher = VoucherId::new();
        let id = store.append(draft(voucher, 1, dec!(5))).unwrap();
        let reversal = store.cancel(id).unwrap();

        let key = BinKey::new("A", "Stores");
        assert_eq!(store.bin_entries(&key).count(), 0);

        let all = store.entries_for_voucher(voucher);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, reversal);
        assert_eq!(all[1].actual_qty, dec!(-5));
        assert!(all.iter().all(|entry| entry.is_cancelled));
    }

    #[test]
    fn test_cancelled_line_may_be_appended_again() {
        let mut store = LedgerStore::new();
        let entry = draft(VoucherId::new(), 1, dec!(1));
        let id = store.append(entry.clone()).unwrap();
        store.cancel(id).unwrap();
        assert!(store.append(entry).is_ok());
    }

    #[test]
    fn test_balance_reflects_written_valuation() {
        let mut store = LedgerStore::new();
        let key = BinKey::new("A", "Stores");
        let id = store.append(draft(VoucherId::new(), 1, dec!(5))).unwrap();
        assert_eq!(store.balance(&key), BinSnapshot::default());

        let valuation = Valuation {
            state: crate::valuation::BinState {
                qty: dec!(5),
                value: dec!(50),
                rate: dec!(10),
                queue: FifoQueue::new(),
            },
            incoming_rate: dec!(10),
            outgoing_rate: Decimal::ZERO,
            stock_value_difference: dec!(50),
        };
        assert!(store.write_valuation(id, valuation.clone()).unwrap());
        assert_eq!(store.balance(&key).value, dec!(50));
        assert!(!store.write_valuation(id, valuation).unwrap());

        assert_eq!(store.balance_at(&key, at(1)).qty, dec!(5));
        assert_eq!(store.balance_at(&key, at(1) - chrono::Duration::seconds(1)).qty, Decimal::ZERO);
    }

    #[test]
    fn test_dependents_index() {
        let mut store = LedgerStore::new();
        let source = store.append(draft(VoucherId::new(), 1, dec!(5))).unwrap();
        let mut linked = draft(VoucherId::new(), 2, dec!(5));
        linked.warehouse = WarehouseCode::from("Shop");
        linked.rate_source = RateSource::Linked(source);
        let target = store.append(linked).unwrap();

        let dependents: Vec<_> = store.dependents_of(source).map(|e| e.id).collect();
        assert_eq!(dependents, vec![target]);
    }
}
