//! The ledger book: every piece of state one operation may change.

use std::collections::HashMap;

use kardex_shared::types::{ItemCode, VoucherId, VoucherLineId};
use rust_decimal::Decimal;

use super::item::Item;
use crate::ledger::GlJournal;
use crate::repost::RepostQueue;
use crate::serial::SerialRegistry;
use crate::stock::{LedgerStore, StockError, StockResult};
use crate::voucher::Voucher;

/// Stock ledger, GL, documents and registries, committed as one unit.
///
/// Operations work on a clone and the service swaps it in on success.
#[derive(Debug, Clone, Default)]
pub struct LedgerBook {
    /// Stock ledger entries.
    pub stock: LedgerStore,
    /// General ledger entries.
    pub gl: GlJournal,
    /// Submitted and cancelled vouchers.
    pub vouchers: HashMap<VoucherId, Voucher>,
    /// Serial movements.
    pub serials: SerialRegistry,
    /// Item master data.
    pub items: HashMap<ItemCode, Item>,
    /// Quantity received per purchase order line.
    pub order_received: HashMap<VoucherLineId, Decimal>,
    /// Repost work left for later.
    pub pending: RepostQueue,
}

impl LedgerBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a voucher.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` for an unknown id.
    pub fn voucher(&self, id: VoucherId) -> StockResult<&Voucher> {
        self.vouchers.get(&id).ok_or(StockError::VoucherNotFound(id))
    }

    /// Looks up a voucher mutably.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` for an unknown id.
    pub fn voucher_mut(&mut self, id: VoucherId) -> StockResult<&mut Voucher> {
        self.vouchers.get_mut(&id).ok_or(StockError::VoucherNotFound(id))
    }

    /// Submitted vouchers that return or bill `id`.
    pub fn referencing(&self, id: VoucherId) -> impl Iterator<Item = &Voucher> {
        self.vouchers
            .values()
            .filter(move |voucher| voucher.is_submitted() && voucher.against == Some(id))
    }
}
