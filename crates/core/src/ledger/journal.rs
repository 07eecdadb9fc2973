//! Append-only general ledger journal.
//!
//! Entries are never edited. A voucher whose valuation changes receives
//! correction entries for the difference, and a cancelled voucher receives a
//! swapped copy of every entry.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use kardex_shared::types::{AccountCode, CostCenterCode, GlEntryId, VoucherId};
use rust_decimal::Decimal;

use super::entry::{GlEntry, GlEntryKind, GlPosting};
use crate::voucher::VoucherType;

/// Net amount per (account, cost center).
pub type NetPostings = BTreeMap<(AccountCode, CostCenterCode), Decimal>;

/// In-memory general ledger.
#[derive(Debug, Clone, Default)]
pub struct GlJournal {
    entries: Vec<GlEntry>,
    by_voucher: HashMap<VoucherId, Vec<usize>>,
}

impl GlJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, in the order written.
    #[must_use]
    pub fn entries(&self) -> &[GlEntry] {
        &self.entries
    }

    /// Every entry of a voucher, in the order written.
    pub fn entries_for_voucher(&self, voucher: VoucherId) -> impl Iterator<Item = &GlEntry> {
        self.by_voucher
            .get(&voucher)
            .into_iter()
            .flatten()
            .filter_map(move |index| self.entries.get(*index))
    }

    /// Returns true if the voucher has any GL entry.
    #[must_use]
    pub fn has_entries(&self, voucher: VoucherId) -> bool {
        self.by_voucher.contains_key(&voucher)
    }

    /// Net debit minus credit per (account, cost center) over the voucher's
    /// non-cancelled entries.
    #[must_use]
    pub fn net(&self, voucher: VoucherId) -> NetPostings {
        let mut net = NetPostings::new();
        for entry in self.entries_for_voucher(voucher).filter(|e| !e.is_cancelled) {
            *net.entry((entry.account.clone(), entry.cost_center.clone()))
                .or_default() += entry.signed_amount();
        }
        net
    }

    /// Brings the voucher's net postings in line with `expected`.
    ///
    /// The first posting of a voucher is written as `Original`; later
    /// differences as `Correction`. Returns the number of entries written.
    pub fn post_diff(
        &mut self,
        voucher_type: VoucherType,
        voucher_id: VoucherId,
        posting_date: NaiveDate,
        expected: &[GlPosting],
    ) -> usize {
        let kind = if self.has_entries(voucher_id) {
            GlEntryKind::Correction
        } else {
            GlEntryKind::Original
        };

        let mut diff = NetPostings::new();
        for posting in expected {
            *diff
                .entry((posting.account.clone(), posting.cost_center.clone()))
                .or_default() += posting.signed_amount();
        }
        for (pair, amount) in self.net(voucher_id) {
            *diff.entry(pair).or_default() -= amount;
        }

        let mut written = 0;
        for ((account, cost_center), amount) in diff {
            if amount.is_zero() {
                continue;
            }
            let posting = GlPosting::from_signed(account, cost_center, amount);
            self.push(GlEntry {
                id: GlEntryId::new(),
                account: posting.account,
                cost_center: posting.cost_center,
                debit: posting.debit,
                credit: posting.credit,
                voucher_type,
                voucher_id,
                posting_date,
                kind,
                is_cancelled: false,
            });
            written += 1;
        }
        written
    }

    /// Cancels a voucher's GL: every live entry is flagged cancelled and
    /// gets a swapped reversal. Returns the number of reversals written.
    pub fn reverse(&mut self, voucher: VoucherId) -> usize {
        let live: Vec<usize> = self
            .by_voucher
            .get(&voucher)
            .into_iter()
            .flatten()
            .copied()
            .filter(|index| self.entries.get(*index).is_some_and(|e| !e.is_cancelled))
            .collect();

        let mut written = 0;
        for index in live {
            let Some(entry) = self.entries.get_mut(index) else {
                continue;
            };
            entry.is_cancelled = true;
            let reversal = entry.reversal();
            self.push(reversal);
            written += 1;
        }
        written
    }

    /// Sum of debits minus credits of a voucher's non-cancelled entries.
    #[must_use]
    pub fn voucher_balance(&self, voucher: VoucherId) -> Decimal {
        self.entries_for_voucher(voucher)
            .filter(|e| !e.is_cancelled)
            .map(GlEntry::signed_amount)
            .sum()
    }

    fn push(&mut self, entry: GlEntry) {
        self.by_voucher
            .entry(entry.voucher_id)
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn posting(account: &str, amount: Decimal) -> GlPosting {
        GlPosting::from_signed(account.into(), "Main".into(), amount)
    }

    #[test]
    fn test_first_post_is_original() {
        let mut journal = GlJournal::new();
        let voucher = VoucherId::new();
        let written = journal.post_diff(
            VoucherType::PurchaseReceipt,
            voucher,
            date(),
            &[posting("Stock", dec!(250)), posting("SRBNB", dec!(-250))],
        );
        assert_eq!(written, 2);
        assert!(journal
            .entries_for_voucher(voucher)
            .all(|e| e.kind == GlEntryKind::Original));
        assert_eq!(journal.voucher_balance(voucher), Decimal::ZERO);
    }

    #[test]
    fn test_diff_writes_corrections_only_for_changes() {
        let mut journal = GlJournal::new();
        let voucher = VoucherId::new();
        journal.post_diff(
            VoucherType::StockTransfer,
            voucher,
            date(),
            &[posting("Stock Shop", dec!(100)), posting("Stock Stores", dec!(-100))],
        );

        let unchanged = journal.post_diff(
            VoucherType::StockTransfer,
            voucher,
            date(),
            &[posting("Stock Shop", dec!(100)), posting("Stock Stores", dec!(-100))],
        );
        assert_eq!(unchanged, 0);

        let written = journal.post_diff(
            VoucherType::StockTransfer,
            voucher,
            date(),
            &[posting("Stock Shop", dec!(200)), posting("Stock Stores", dec!(-200))],
        );
        assert_eq!(written, 2);
        let corrections: Vec<_> = journal
            .entries_for_voucher(voucher)
            .filter(|e| e.kind == GlEntryKind::Correction)
            .collect();
        assert_eq!(corrections.len(), 2);
        let net = journal.net(voucher);
        let key = (AccountCode::from("Stock Shop"), CostCenterCode::from("Main"));
        assert_eq!(net[&key], dec!(200));
        assert_eq!(journal.voucher_balance(voucher), Decimal::ZERO);
    }

    #[test]
    fn test_reverse_cancels_everything() {
        let mut journal = GlJournal::new();
        let voucher = VoucherId::new();
        journal.post_diff(
            VoucherType::PurchaseReceipt,
            voucher,
            date(),
            &[posting("Stock", dec!(250)), posting("SRBNB", dec!(-250))],
        );
        assert_eq!(journal.reverse(voucher), 2);
        assert!(journal.net(voucher).is_empty());
        assert!(journal.entries_for_voucher(voucher).all(|e| e.is_cancelled));
        let reversal_total: Decimal = journal
            .entries_for_voucher(voucher)
            .filter(|e| e.kind == GlEntryKind::Reversal)
            .map(|e| e.debit)
            .sum();
        assert_eq!(reversal_total, dec!(250));

        assert_eq!(journal.reverse(voucher), 0);
    }
}
