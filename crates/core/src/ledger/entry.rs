//! General ledger entry domain types.

use chrono::NaiveDate;
use kardex_shared::types::{AccountCode, CostCenterCode, GlEntryId, VoucherId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::voucher::VoucherType;

/// Why a GL entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlEntryKind {
    /// Posted when the voucher was submitted.
    Original,
    /// Difference posted after the voucher's valuation changed.
    Correction,
    /// Swapped copy of an entry, posted on cancellation.
    Reversal,
}

/// A posting to be written for one (account, cost center) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlPosting {
    /// The account.
    pub account: AccountCode,
    /// The cost center.
    pub cost_center: CostCenterCode,
    /// Debit amount (0 if credit).
    pub debit: Decimal,
    /// Credit amount (0 if debit).
    pub credit: Decimal,
}

impl GlPosting {
    /// Builds a posting from a signed amount (positive debits).
    #[must_use]
    pub fn from_signed(account: AccountCode, cost_center: CostCenterCode, amount: Decimal) -> Self {
        let (debit, credit) = if amount > Decimal::ZERO {
            (amount, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -amount)
        };
        Self {
            account,
            cost_center,
            debit,
            credit,
        }
    }

    /// Debit minus credit.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A single general ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlEntry {
    /// Unique identifier for this entry.
    pub id: GlEntryId,
    /// The account affected.
    pub account: AccountCode,
    /// The cost center.
    pub cost_center: CostCenterCode,
    /// Debit amount (0 if credit).
    pub debit: Decimal,
    /// Credit amount (0 if debit).
    pub credit: Decimal,
    /// Type of the originating voucher.
    pub voucher_type: VoucherType,
    /// The originating voucher.
    pub voucher_id: VoucherId,
    /// Posting date of the voucher.
    pub posting_date: NaiveDate,
    /// Why the entry was written.
    pub kind: GlEntryKind,
    /// Whether the voucher was cancelled.
    pub is_cancelled: bool,
}

impl GlEntry {
    /// Debit minus credit.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }

    /// Builds the reversing entry: debit and credit swapped.
    #[must_use]
    pub fn reversal(&self) -> Self {
        Self {
            id: GlEntryId::new(),
            debit: self.credit,
            credit: self.debit,
            kind: GlEntryKind::Reversal,
            is_cancelled: true,
            ..self.clone()
        }
    }
}
