//! Inventory service: the entry point for posting and querying stock.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use chrono::NaiveDateTime;
use kardex_shared::types::{ItemCode, Precision, SerialNo, VoucherId, WarehouseCode};
use kardex_shared::{AppConfig, StockSettings};

use super::book::LedgerBook;
use super::item::Item;
use super::pipeline::{CancelOutcome, Pipeline, SubmitOutcome};
use crate::ledger::{AccountResolver, GlEntry, TrialBalance};
use crate::repost::{RepostItem, RepostReport};
use crate::serial::{SerialAllocator, SeriesAllocator};
use crate::stock::{BinKey, PostingKey, StockError, StockLedgerEntry, StockResult};
use crate::valuation::BinSnapshot;
use crate::voucher::{
    AllocationBasis, BillingService, LandedCharge, ReturnRequest, ReturnResolver, StatusService,
    Voucher,
};

/// Posts vouchers into the stock ledger and the general ledger.
///
/// Every mutating operation runs against a staged copy of the book and
/// replaces the committed book only when all of its stages succeed. Writers
/// are serialized; readers see the last committed book.
pub struct InventoryService {
    book: RwLock<LedgerBook>,
    settings: StockSettings,
    precision: Precision,
    accounts: Arc<dyn AccountResolver>,
    serials: Mutex<Box<dyn SerialAllocator>>,
}

impl InventoryService {
    /// Creates a service from application config.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            config.stock.clone(),
            config.precision,
            Arc::new(config.accounts.clone()),
            Box::new(SeriesAllocator::new()),
        )
    }

    /// Creates a service with a custom account resolver and serial allocator.
    #[must_use]
    pub fn with_parts(
        settings: StockSettings,
        precision: Precision,
        accounts: Arc<dyn AccountResolver>,
        serials: Box<dyn SerialAllocator>,
    ) -> Self {
        Self {
            book: RwLock::new(LedgerBook::new()),
            settings,
            precision,
            accounts,
            serials: Mutex::new(serials),
        }
    }

    /// Stock settings in effect.
    #[must_use]
    pub fn settings(&self) -> &StockSettings {
        &self.settings
    }

    /// Registers or replaces item master data.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn register_item(&self, item: Item) -> StockResult<()> {
        self.transact(|_, book| {
            book.items.insert(item.code.clone(), item);
            Ok(())
        })
    }

    /// Submits a draft voucher.
    ///
    /// # Errors
    ///
    /// Any error of validation, posting or reposting. The book is left
    /// untouched on error.
    pub fn submit_transaction(&self, voucher: Voucher) -> StockResult<SubmitOutcome> {
        let voucher_type = voucher.voucher_type;
        let mut allocator = self
            .serials
            .lock()
            .map_err(|_| StockError::Internal("serial allocator lock poisoned".to_string()))?;
        let outcome = self.transact(|pipeline, book| pipeline.submit(book, voucher, &mut **allocator));
        drop(allocator);

        match &outcome {
            Ok(outcome) => tracing::info!(
                voucher_id = %outcome.voucher_id,
                voucher_type = %voucher_type,
                status = %outcome.status,
                stock_entries = outcome.stock_entries.len(),
                reposted = outcome.repost.entries_rewritten,
                gl_entries = outcome.gl_entries_written,
                "voucher submitted"
            ),
            Err(e) => tracing::warn!(
                voucher_type = %voucher_type,
                error_code = e.error_code(),
                error = %e,
                "voucher rejected"
            ),
        }
        outcome
    }

    /// Cancels a submitted voucher.
    ///
    /// # Errors
    ///
    /// Any error of the cancel stages; the book is left untouched on error.
    pub fn cancel_transaction(&self, id: VoucherId) -> StockResult<CancelOutcome> {
        let outcome = self.transact(|pipeline, book| pipeline.cancel(book, id));
        match &outcome {
            Ok(outcome) => tracing::info!(
                voucher_id = %id,
                stock_entries = outcome.stock_entries_reversed,
                gl_entries = outcome.gl_entries_reversed,
                reposted = outcome.repost.entries_rewritten,
                "voucher cancelled"
            ),
            Err(e) => tracing::warn!(
                voucher_id = %id,
                error_code = e.error_code(),
                error = %e,
                "cancellation rejected"
            ),
        }
        outcome
    }

    /// Recomputes a bin from `from` onwards and everything depending on it.
    ///
    /// # Errors
    ///
    /// Valuation and consistency errors of the repost.
    pub fn repost_from(&self, key: &BinKey, from: NaiveDateTime) -> StockResult<RepostReport> {
        let report = self.transact(|pipeline, book| {
            pipeline.repost_from(book, key.clone(), PostingKey::start_of(from))
        })?;
        tracing::info!(
            bin = %key,
            from = %from,
            bins = report.touched_bins.len(),
            reposted = report.entries_rewritten,
            "bin reposted"
        );
        Ok(report)
    }

    /// Runs all deferred repost work.
    ///
    /// # Errors
    ///
    /// Valuation and consistency errors of the repost.
    pub fn run_pending_reposts(&self) -> StockResult<RepostReport> {
        let report = self.transact(|pipeline, book| pipeline.drain(book))?;
        if report.passes > 0 {
            tracing::info!(
                bins = report.touched_bins.len(),
                reposted = report.entries_rewritten,
                "pending reposts completed"
            );
        }
        Ok(report)
    }

    /// Bins with repost work outstanding.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn pending_reposts(&self) -> StockResult<Vec<RepostItem>> {
        Ok(self.read()?.pending.items())
    }

    /// Adds landed charges to a submitted receipt and reposts from it.
    ///
    /// # Errors
    ///
    /// - `Validation` if the voucher is not a submitted receipt
    /// - Valuation and consistency errors of the repost
    pub fn apply_landed_cost(
        &self,
        receipt: VoucherId,
        charges: &[LandedCharge],
        basis: AllocationBasis,
    ) -> StockResult<RepostReport> {
        let report =
            self.transact(|pipeline, book| pipeline.apply_landed_cost(book, receipt, charges, basis))?;
        tracing::info!(
            voucher_id = %receipt,
            charges = charges.len(),
            reposted = report.entries_rewritten,
            "landed cost applied"
        );
        Ok(report)
    }

    /// Current balance of a bin, running its pending reposts first.
    ///
    /// # Errors
    ///
    /// Valuation and consistency errors of the pending repost.
    pub fn get_valuation(&self, item: &ItemCode, warehouse: &WarehouseCode) -> StockResult<BinSnapshot> {
        let key = BinKey::new(item.clone(), warehouse.clone());
        if self.read()?.pending.pending_from(&key).is_some() {
            self.run_pending_reposts()?;
        }
        Ok(self.read()?.stock.balance(&key))
    }

    /// Current balance of a bin without running pending reposts.
    ///
    /// # Errors
    ///
    /// Returns `RepostPending` while the bin waits for a repost.
    pub fn try_valuation(&self, item: &ItemCode, warehouse: &WarehouseCode) -> StockResult<BinSnapshot> {
        let key = BinKey::new(item.clone(), warehouse.clone());
        let book = self.read()?;
        if book.pending.pending_from(&key).is_some() {
            return Err(StockError::RepostPending {
                item: key.item,
                warehouse: key.warehouse,
            });
        }
        Ok(book.stock.balance(&key))
    }

    /// Balance of a bin as of a point in time.
    ///
    /// # Errors
    ///
    /// Returns `RepostPending` while the bin waits for a repost from or before
    /// `as_of`.
    pub fn compute_rate(
        &self,
        item: &ItemCode,
        warehouse: &WarehouseCode,
        as_of: NaiveDateTime,
    ) -> StockResult<BinSnapshot> {
        let key = BinKey::new(item.clone(), warehouse.clone());
        let book = self.read()?;
        if book
            .pending
            .pending_from(&key)
            .is_some_and(|from| from.posted_at <= as_of)
        {
            return Err(StockError::RepostPending {
                item: key.item,
                warehouse: key.warehouse,
            });
        }
        Ok(book.stock.balance_at(&key, as_of))
    }

    /// Drafts a return of selected lines of a submitted voucher.
    ///
    /// # Errors
    ///
    /// - `VoucherNotFound` for an unknown voucher
    /// - `Validation` if the voucher cannot be returned
    pub fn make_return(
        &self,
        original: VoucherId,
        requests: &[ReturnRequest],
        posted_at: NaiveDateTime,
    ) -> StockResult<Voucher> {
        let book = self.read()?;
        let voucher = book.voucher(original)?;
        let in_stock = |serials: &[SerialNo], warehouse: &WarehouseCode| book.serials.in_warehouse(serials, warehouse);
        ReturnResolver::make_return(voucher, requests, posted_at, &in_stock)
    }

    /// Drafts a return of everything not yet returned.
    ///
    /// # Errors
    ///
    /// As [`Self::make_return`].
    pub fn make_full_return(&self, original: VoucherId, posted_at: NaiveDateTime) -> StockResult<Voucher> {
        let requests = ReturnResolver::full_return_requests(self.read()?.voucher(original)?);
        self.make_return(original, &requests, posted_at)
    }

    /// Drafts a return of the rejected qty only.
    ///
    /// # Errors
    ///
    /// As [`Self::make_return`].
    pub fn make_rejected_return(&self, original: VoucherId, posted_at: NaiveDateTime) -> StockResult<Voucher> {
        let requests = ReturnResolver::rejected_return_requests(self.read()?.voucher(original)?);
        self.make_return(original, &requests, posted_at)
    }

    /// Drafts an invoice billing what remains of a receipt.
    ///
    /// # Errors
    ///
    /// - `VoucherNotFound` for an unknown receipt
    /// - `Validation` if nothing is left to bill
    pub fn make_invoice(&self, receipt: VoucherId, posted_at: NaiveDateTime) -> StockResult<Voucher> {
        let book = self.read()?;
        BillingService::make_invoice(book.voucher(receipt)?, posted_at)
    }

    /// Closes a submitted voucher against further returns and billing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the voucher is submitted and open.
    pub fn close_voucher(&self, id: VoucherId) -> StockResult<Voucher> {
        self.transact(|_, book| {
            let voucher = book.voucher_mut(id)?;
            StatusService::close(voucher)?;
            Ok(voucher.clone())
        })
    }

    /// Reopens a closed voucher.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the voucher is closed.
    pub fn reopen_voucher(&self, id: VoucherId) -> StockResult<Voucher> {
        let precision = self.precision;
        self.transact(|_, book| {
            let voucher = book.voucher_mut(id)?;
            StatusService::reopen(voucher, &precision)?;
            Ok(voucher.clone())
        })
    }

    /// A submitted or cancelled voucher.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` for an unknown id.
    pub fn voucher(&self, id: VoucherId) -> StockResult<Voucher> {
        self.read()?.voucher(id).cloned()
    }

    /// Stock ledger entries of a voucher, reversals included.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn stock_entries(&self, voucher: VoucherId) -> StockResult<Vec<StockLedgerEntry>> {
        Ok(self
            .read()?
            .stock
            .entries_for_voucher(voucher)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Stock ledger entries of a bin in posting order.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn bin_entries(&self, item: &ItemCode, warehouse: &WarehouseCode) -> StockResult<Vec<StockLedgerEntry>> {
        let key = BinKey::new(item.clone(), warehouse.clone());
        Ok(self.read()?.stock.bin_entries(&key).cloned().collect())
    }

    /// GL entries of a voucher, corrections and reversals included.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn gl_entries(&self, voucher: VoucherId) -> StockResult<Vec<GlEntry>> {
        Ok(self.read()?.gl.entries_for_voucher(voucher).cloned().collect())
    }

    /// Trial balance over all GL entries.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the book lock is poisoned.
    pub fn trial_balance(&self) -> StockResult<TrialBalance> {
        Ok(TrialBalance::from_entries(self.read()?.gl.entries()))
    }

    fn read(&self) -> StockResult<RwLockReadGuard<'_, LedgerBook>> {
        self.book
            .read()
            .map_err(|_| StockError::Internal("ledger book lock poisoned".to_string()))
    }

    /// Runs `op` on a staged copy of the book and commits it on success.
    fn transact<T>(
        &self,
        op: impl FnOnce(&Pipeline<'_>, &mut LedgerBook) -> StockResult<T>,
    ) -> StockResult<T> {
        let mut book = self
            .book
            .write()
            .map_err(|_| StockError::Internal("ledger book lock poisoned".to_string()))?;
        let pipeline = Pipeline::new(&self.settings, self.precision, self.accounts.as_ref());

        let mut staged = book.clone();
        let value = op(&pipeline, &mut staged)?;
        *book = staged;
        Ok(value)
    }
}
