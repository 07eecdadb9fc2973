//! Posting pipeline.
//!
//! Submission runs in fixed stages against a staged [`LedgerBook`]:
//! validate, append ledger entries, repost, regenerate GL. Cancellation and
//! landed costs reuse the repost and GL stages. The caller persists the book
//! only if every stage succeeds.

use std::collections::{BTreeMap, BTreeSet};

use kardex_shared::types::{
    ItemCode, Precision, SerialNo, StockEntryId, VoucherId, VoucherLineId, WarehouseCode,
};
use kardex_shared::{RepostMode, StockSettings};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use super::book::LedgerBook;
use crate::ledger::{AccountResolver, GlTranslator};
use crate::repost::{ChainVerifier, RepostReport, RepostScheduler};
use crate::serial::SerialAllocator;
use crate::stock::{
    BinKey, NewStockEntry, PostingKey, RateSource, StockError, StockLedgerEntry, StockResult,
};
use crate::valuation::{ValuationEngine, resolve_method};
use crate::voucher::{
    AllocationBasis, BillingService, ChargeAllocator, DocStatus, LandedCharge, ReturnResolver,
    StatusService, Voucher, VoucherLine, VoucherStatus, VoucherType, VoucherValidator,
};

/// Result of submitting a voucher.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    /// The submitted voucher.
    pub voucher_id: VoucherId,
    /// Its status after submission.
    pub status: VoucherStatus,
    /// Stock entries appended for it.
    pub stock_entries: Vec<StockEntryId>,
    /// What reposting changed.
    pub repost: RepostReport,
    /// GL entries written, corrections of other vouchers included.
    pub gl_entries_written: usize,
    /// Bins left with repost work.
    pub pending_reposts: usize,
}

/// Result of cancelling a voucher.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    /// The cancelled voucher.
    pub voucher_id: VoucherId,
    /// Stock entries reversed.
    pub stock_entries_reversed: usize,
    /// GL entries reversed.
    pub gl_entries_reversed: usize,
    /// What reposting changed.
    pub repost: RepostReport,
    /// Correction entries written for other vouchers.
    pub gl_entries_written: usize,
}

/// Runs the posting stages with one set of settings.
pub struct Pipeline<'a> {
    settings: &'a StockSettings,
    precision: Precision,
    engine: ValuationEngine,
    accounts: &'a dyn AccountResolver,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(settings: &'a StockSettings, precision: Precision, accounts: &'a dyn AccountResolver) -> Self {
        Self {
            settings,
            precision,
            engine: ValuationEngine::new(settings, precision),
            accounts,
        }
    }

    /// Submits a draft voucher.
    ///
    /// # Errors
    ///
    /// Any validation, serial, valuation or consistency error of the stages.
    pub fn submit(
        &self,
        book: &mut LedgerBook,
        mut voucher: Voucher,
        allocator: &mut dyn SerialAllocator,
    ) -> StockResult<SubmitOutcome> {
        let mut repost = self.drain(book)?;

        self.validate(book, &mut voucher, allocator)?;
        let entries = self.post_ledger(book, &voucher)?;

        let voucher_id = voucher.id;
        voucher.doc_status = DocStatus::Submitted;
        StatusService::refresh(&mut voucher, &self.precision);
        self.apply_links(book, &voucher, Decimal::ONE)?;
        book.vouchers.insert(voucher_id, voucher);

        let (stage, gl_entries_written) = match self.settings.repost_mode {
            RepostMode::Immediate => {
                for id in &entries {
                    Self::queue_entry(book, *id);
                }
                self.settle(book, &[voucher_id])?
            }
            RepostMode::Deferred => {
                let report = self.value_new_entries(book, &entries)?;
                let mut vouchers = report.touched_vouchers.clone();
                vouchers.insert(voucher_id);
                let written = self.post_gl(book, vouchers)?;
                (report, written)
            }
        };
        repost.merge(stage);

        let status = book.voucher(voucher_id)?.status;
        Ok(SubmitOutcome {
            voucher_id,
            status,
            stock_entries: entries,
            repost,
            gl_entries_written,
            pending_reposts: book.pending.len(),
        })
    }

    /// Cancels a submitted voucher.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless the voucher is submitted
    /// - `Validation` while submitted vouchers still reference it
    /// - `SerialNoExistsInFutureTransaction` if its serials moved later
    /// - Valuation and consistency errors of the repost
    pub fn cancel(&self, book: &mut LedgerBook, id: VoucherId) -> StockResult<CancelOutcome> {
        let mut repost = self.drain(book)?;

        let voucher = book.voucher(id)?.clone();
        if !voucher.is_submitted() {
            return Err(StockError::InvalidTransition {
                from: voucher.status.to_string(),
                to: VoucherStatus::Cancelled.to_string(),
            });
        }
        let referencing = book.referencing(id).count();
        if referencing > 0 {
            return Err(StockError::Validation(format!(
                "voucher {id} is referenced by {referencing} submitted voucher(s); cancel them first"
            )));
        }

        book.serials.cancel_voucher(id)?;
        let active: Vec<(StockEntryId, BinKey, PostingKey)> = book
            .stock
            .entries_for_voucher(id)
            .into_iter()
            .filter(|entry| entry.is_active())
            .map(|entry| (entry.id, entry.key(), entry.posting))
            .collect();
        for (entry, key, posting) in &active {
            book.stock.cancel(*entry)?;
            book.pending.push_downstream(&book.stock, key.clone(), *posting);
        }
        let gl_entries_reversed = book.gl.reverse(id);

        self.apply_links(book, &voucher, Decimal::NEGATIVE_ONE)?;
        let cancelled = book.voucher_mut(id)?;
        cancelled.doc_status = DocStatus::Cancelled;
        cancelled.status = VoucherStatus::Cancelled;

        let (stage, gl_entries_written) = match self.settings.repost_mode {
            RepostMode::Immediate => self.settle(book, &[])?,
            RepostMode::Deferred => (RepostReport::default(), 0),
        };
        repost.merge(stage);

        Ok(CancelOutcome {
            voucher_id: id,
            stock_entries_reversed: active.len(),
            gl_entries_reversed,
            repost,
            gl_entries_written,
        })
    }

    /// Reposts one bin from `from` and everything depending on it.
    ///
    /// # Errors
    ///
    /// Valuation and consistency errors of the repost.
    pub fn repost_from(&self, book: &mut LedgerBook, key: BinKey, from: PostingKey) -> StockResult<RepostReport> {
        book.pending.push(key, from);
        Ok(self.settle(book, &[])?.0)
    }

    /// Drains all pending repost work.
    ///
    /// # Errors
    ///
    /// Valuation and consistency errors of the repost.
    pub fn drain(&self, book: &mut LedgerBook) -> StockResult<RepostReport> {
        if book.pending.is_empty() {
            return Ok(RepostReport::default());
        }
        Ok(self.settle(book, &[])?.0)
    }

    /// Adds valuation charges to a submitted receipt and reposts from it.
    ///
    /// # Errors
    ///
    /// - `Validation` if the voucher is not an open receipt or no line can
    ///   carry a charge
    /// - Valuation and consistency errors of the repost
    pub fn apply_landed_cost(
        &self,
        book: &mut LedgerBook,
        receipt_id: VoucherId,
        charges: &[LandedCharge],
        basis: AllocationBasis,
    ) -> StockResult<RepostReport> {
        let mut repost = self.drain(book)?;

        let mut receipt = book.voucher(receipt_id)?.clone();
        if !matches!(
            receipt.voucher_type,
            VoucherType::PurchaseReceipt | VoucherType::MaterialReceipt
        ) || receipt.is_return
        {
            return Err(StockError::Validation(format!(
                "landed costs apply to receipts only, not to {}",
                receipt.voucher_type
            )));
        }
        if !receipt.is_submitted() {
            return Err(StockError::Validation(format!(
                "receipt {receipt_id} is not submitted"
            )));
        }
        if charges.is_empty() {
            return Err(StockError::Validation("no landed charges given".to_string()));
        }
        for charge in charges {
            ChargeAllocator::allocate(
                &mut receipt.lines,
                &charge.account,
                charge.amount,
                basis,
                &self.precision,
            )?;
        }

        for line in receipt.lines.iter().filter(|line| line.qty > Decimal::ZERO) {
            let Some(warehouse) = &line.warehouse else {
                continue;
            };
            let Some((entry, key, posting)) = book
                .stock
                .entries_for_voucher(receipt_id)
                .into_iter()
                .find(|entry| {
                    entry.is_active()
                        && entry.voucher_line_id == line.id
                        && &entry.warehouse == warehouse
                })
                .map(|entry| (entry.id, entry.key(), entry.posting))
            else {
                return Err(StockError::Internal(format!(
                    "no stock entry for line {} of receipt {receipt_id}",
                    line.id
                )));
            };
            book.stock
                .set_rate_source(entry, RateSource::Explicit(line.valuation_rate(&self.precision)))?;
            book.pending.push(key, posting);
        }
        book.vouchers.insert(receipt_id, receipt);

        let (stage, _) = self.settle(book, &[receipt_id])?;
        repost.merge(stage);
        Ok(repost)
    }

    // ---- validate -------------------------------------------------------

    fn validate(
        &self,
        book: &LedgerBook,
        voucher: &mut Voucher,
        allocator: &mut dyn SerialAllocator,
    ) -> StockResult<()> {
        if voucher.doc_status != DocStatus::Draft {
            return Err(StockError::InvalidTransition {
                from: voucher.status.to_string(),
                to: "submitted".to_string(),
            });
        }
        if book.vouchers.contains_key(&voucher.id) {
            return Err(StockError::Validation(format!(
                "voucher {} was already submitted",
                voucher.id
            )));
        }
        VoucherValidator::validate(voucher, &self.precision)?;
        ChargeAllocator::allocate_voucher_charges(voucher, &self.precision)?;
        self.check_links(book, voucher)?;
        self.check_order_allowance(book, voucher)?;
        Self::fill_serials(book, voucher, allocator)
    }

    fn check_links(&self, book: &LedgerBook, voucher: &Voucher) -> StockResult<()> {
        let Some(against) = voucher.against else {
            return Ok(());
        };
        let original = book.voucher(against)?;
        if voucher.voucher_type == VoucherType::PurchaseInvoice
            && original.voucher_type == VoucherType::PurchaseReceipt
        {
            BillingService::validate(voucher, original, self.settings.over_billing_allowance)
        } else if voucher.is_return {
            ReturnResolver::validate(voucher, original, self.settings.over_receipt_allowance)
        } else {
            Err(StockError::Validation(format!(
                "{} cannot reference a {}",
                voucher.voucher_type, original.voucher_type
            )))
        }
    }

    fn check_order_allowance(&self, book: &LedgerBook, voucher: &Voucher) -> StockResult<()> {
        if voucher.voucher_type != VoucherType::PurchaseReceipt || voucher.is_return {
            return Ok(());
        }
        let mut received: BTreeMap<VoucherLineId, (ItemCode, Decimal, Decimal)> = BTreeMap::new();
        for line in &voucher.lines {
            let Some(order) = &line.order_line else {
                continue;
            };
            let total = received.entry(order.line).or_insert_with(|| {
                let already = book.order_received.get(&order.line).copied().unwrap_or_default();
                (line.item.clone(), order.ordered_qty, already)
            });
            total.2 += line.received_qty;
        }

        let allowance = self.settings.over_receipt_allowance;
        for (item, ordered, attempted) in received.into_values() {
            let allowed = ordered * (Decimal::ONE + allowance / Decimal::ONE_HUNDRED);
            if attempted > allowed {
                return Err(StockError::OverAllowance {
                    item,
                    attempted,
                    allowed,
                    allowance,
                });
            }
        }
        Ok(())
    }

    fn fill_serials(
        book: &LedgerBook,
        voucher: &mut Voucher,
        allocator: &mut dyn SerialAllocator,
    ) -> StockResult<()> {
        if !voucher.voucher_type.moves_stock() {
            return Ok(());
        }
        let can_allocate = matches!(
            voucher.voucher_type,
            VoucherType::PurchaseReceipt | VoucherType::MaterialReceipt
        ) && !voucher.is_return;

        for line in &mut voucher.lines {
            let serialized = book.items.get(&line.item).filter(|item| item.has_serial_no);
            let Some(item) = serialized else {
                if !line.serial_nos.is_empty() || !line.rejected_serial_nos.is_empty() {
                    return Err(StockError::Validation(format!(
                        "item {} does not carry serial numbers",
                        line.item
                    )));
                }
                continue;
            };
            let series = item
                .serial_series
                .clone()
                .unwrap_or_else(|| format!("{}-", item.code));
            for (qty, serials) in [
                (line.qty, &mut line.serial_nos),
                (line.rejected_qty, &mut line.rejected_serial_nos),
            ] {
                let count = serial_count(&line.item, qty)?;
                if serials.is_empty() && count > 0 && can_allocate {
                    *serials = allocator.allocate(&series, count);
                }
                if serials.len() != count {
                    return Err(StockError::Validation(format!(
                        "item {} needs {count} serial numbers, got {}",
                        line.item,
                        serials.len()
                    )));
                }
            }
        }
        Ok(())
    }

    // ---- ledger ---------------------------------------------------------

    fn post_ledger(&self, book: &mut LedgerBook, voucher: &Voucher) -> StockResult<Vec<StockEntryId>> {
        let mut ids = Vec::new();
        for line in &voucher.lines {
            match voucher.voucher_type {
                VoucherType::PurchaseReceipt | VoucherType::MaterialReceipt => {
                    if !line.qty.is_zero() {
                        let warehouse = required(line.warehouse.as_ref(), line)?;
                        let source = if voucher.is_return {
                            RateSource::ReturnAgainst(original_entry(book, voucher, line, warehouse)?)
                        } else {
                            RateSource::Explicit(line.valuation_rate(&self.precision))
                        };
                        let allow_zero = line.allow_zero_valuation_rate;
                        ids.push(append(book, voucher, line, warehouse, line.qty, source, allow_zero, &line.serial_nos)?);
                    }
                    if !line.rejected_qty.is_zero() {
                        let warehouse = required(line.rejected_warehouse.as_ref(), line)?;
                        let valued = self.settings.value_rejected_materials;
                        let source = if voucher.is_return {
                            RateSource::ReturnAgainst(original_entry(book, voucher, line, warehouse)?)
                        } else if valued {
                            RateSource::Explicit(line.rate)
                        } else {
                            RateSource::Explicit(Decimal::ZERO)
                        };
                        let allow_zero = line.allow_zero_valuation_rate || !valued;
                        ids.push(append(
                            book,
                            voucher,
                            line,
                            warehouse,
                            line.rejected_qty,
                            source,
                            allow_zero,
                            &line.rejected_serial_nos,
                        )?);
                    }
                }
                VoucherType::MaterialIssue => {
                    let warehouse = required(line.warehouse.as_ref(), line)?;
                    ids.push(append(book, voucher, line, warehouse, -line.qty, RateSource::Valuation, false, &line.serial_nos)?);
                }
                VoucherType::DeliveryNote if voucher.is_return => {
                    let warehouse = required(line.warehouse.as_ref(), line)?;
                    let source = RateSource::ReturnAgainst(original_entry(book, voucher, line, warehouse)?);
                    ids.push(append(book, voucher, line, warehouse, -line.qty, source, false, &line.serial_nos)?);
                }
                VoucherType::DeliveryNote | VoucherType::StockTransfer => {
                    let warehouse = required(line.warehouse.as_ref(), line)?;
                    let out = append(book, voucher, line, warehouse, -line.qty, RateSource::Valuation, false, &line.serial_nos)?;
                    ids.push(out);
                    if let Some(target) = &line.target_warehouse {
                        ids.push(append(book, voucher, line, target, line.qty, RateSource::Linked(out), true, &line.serial_nos)?);
                    }
                }
                VoucherType::PurchaseInvoice => {}
            }
        }
        Ok(ids)
    }

    fn apply_links(&self, book: &mut LedgerBook, voucher: &Voucher, sign: Decimal) -> StockResult<()> {
        for line in &voucher.lines {
            if let Some(order) = &line.order_line {
                *book.order_received.entry(order.line).or_default() += sign * line.received_qty;
            }
        }

        let Some(against) = voucher.against else {
            return Ok(());
        };
        let original = book.voucher_mut(against)?;
        if voucher.voucher_type == VoucherType::PurchaseInvoice
            && original.voucher_type == VoucherType::PurchaseReceipt
        {
            BillingService::apply(original, voucher, sign, &self.precision);
        } else if voucher.is_return {
            ReturnResolver::apply(original, voucher, sign);
        }
        StatusService::refresh(original, &self.precision);
        Ok(())
    }

    // ---- repost ---------------------------------------------------------

    fn queue_entry(book: &mut LedgerBook, id: StockEntryId) {
        if let Some(entry) = book.stock.get(id) {
            let (key, posting) = (entry.key(), entry.posting);
            book.pending.push(key, posting);
        }
    }

    /// Runs pending work, verifies touched bins and regenerates the GL of
    /// every touched voucher plus `extra`.
    fn settle(&self, book: &mut LedgerBook, extra: &[VoucherId]) -> StockResult<(RepostReport, usize)> {
        let default = self.settings.default_valuation_method;
        let items = &book.items;
        let methods = move |item: &ItemCode| {
            resolve_method(items.get(item).and_then(|item| item.valuation_method), default)
        };
        let scheduler = RepostScheduler::new(&self.engine, &methods, self.settings.max_repost_passes);
        let report = scheduler.run(&mut book.stock, &mut book.pending)?;

        if self.settings.verify_chains {
            let bins: Vec<BinKey> = report.touched_bins.iter().cloned().collect();
            ChainVerifier::verify(&book.stock, &self.engine, &methods, &bins)?;
        }

        let mut vouchers = report.touched_vouchers.clone();
        vouchers.extend(extra.iter().copied());
        let written = self.post_gl(book, vouchers)?;
        Ok((report, written))
    }

    fn value_new_entries(&self, book: &mut LedgerBook, ids: &[StockEntryId]) -> StockResult<RepostReport> {
        let default = self.settings.default_valuation_method;
        let items = &book.items;
        let methods = move |item: &ItemCode| {
            resolve_method(items.get(item).and_then(|item| item.valuation_method), default)
        };
        let scheduler = RepostScheduler::new(&self.engine, &methods, self.settings.max_repost_passes);
        let report = scheduler.value_entries(&mut book.stock, ids, &mut book.pending)?;

        if self.settings.verify_chains {
            let bins: Vec<BinKey> = report
                .touched_bins
                .iter()
                .filter(|key| book.pending.pending_from(key).is_none())
                .cloned()
                .collect();
            ChainVerifier::verify(&book.stock, &self.engine, &methods, &bins)?;
        }
        Ok(report)
    }

    // ---- gl -------------------------------------------------------------

    fn post_gl(&self, book: &mut LedgerBook, vouchers: BTreeSet<VoucherId>) -> StockResult<usize> {
        let mut written = 0;
        for id in vouchers {
            let Some(voucher) = book.vouchers.get(&id) else {
                continue;
            };
            if !voucher.is_submitted() {
                continue;
            }
            let entries: Vec<&StockLedgerEntry> = book
                .stock
                .entries_for_voucher(id)
                .into_iter()
                .filter(|entry| entry.is_active())
                .collect();
            let postings =
                GlTranslator::translate(voucher, &entries, self.settings, self.accounts, &self.precision);
            written += book
                .gl
                .post_diff(voucher.voucher_type, id, voucher.posted_at.date(), &postings);

            let balance = book.gl.voucher_balance(id);
            if !balance.is_zero() {
                return Err(StockError::Consistency(format!(
                    "GL of voucher {id} is off by {balance}"
                )));
            }
        }
        Ok(written)
    }
}

fn required<'v>(warehouse: Option<&'v WarehouseCode>, line: &VoucherLine) -> StockResult<&'v WarehouseCode> {
    warehouse.ok_or_else(|| StockError::Validation(format!("item {} needs a warehouse", line.item)))
}

fn serial_count(item: &ItemCode, qty: Decimal) -> StockResult<usize> {
    let qty = qty.abs();
    match qty.to_usize() {
        Some(count) if qty.fract().is_zero() => Ok(count),
        _ => Err(StockError::Validation(format!(
            "qty {qty} of serialized item {item} must be a whole number"
        ))),
    }
}

/// The original entry a return line moves back against.
fn original_entry(
    book: &LedgerBook,
    voucher: &Voucher,
    line: &VoucherLine,
    warehouse: &WarehouseCode,
) -> StockResult<StockEntryId> {
    let (Some(original), Some(against_line)) = (voucher.against, line.against_line) else {
        return Err(StockError::Validation(format!(
            "return line for item {} must reference an original line",
            line.item
        )));
    };
    book.stock
        .entries_for_voucher(original)
        .into_iter()
        .find(|entry| {
            entry.is_active()
                && !entry.is_reversal
                && entry.voucher_line_id == against_line
                && &entry.warehouse == warehouse
        })
        .map(|entry| entry.id)
        .ok_or(StockError::LineNotFound(against_line))
}

#[allow(clippy::too_many_arguments)]
fn append(
    book: &mut LedgerBook,
    voucher: &Voucher,
    line: &VoucherLine,
    warehouse: &WarehouseCode,
    qty: Decimal,
    rate_source: RateSource,
    allow_zero_valuation_rate: bool,
    serials: &[SerialNo],
) -> StockResult<StockEntryId> {
    for serial in serials {
        if qty > Decimal::ZERO {
            book.serials.receive(serial, warehouse, voucher.id, voucher.posted_at)?;
        } else {
            book.serials.issue(serial, warehouse, voucher.id, voucher.posted_at)?;
        }
    }
    book.stock.append(NewStockEntry {
        item: line.item.clone(),
        warehouse: warehouse.clone(),
        voucher_type: voucher.voucher_type,
        voucher_id: voucher.id,
        voucher_line_id: line.id,
        posted_at: voucher.posted_at,
        actual_qty: qty,
        rate_source,
        allow_zero_valuation_rate,
    })
}
