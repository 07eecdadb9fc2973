//! Stock ledger entry domain types.

use chrono::NaiveDateTime;
use kardex_shared::types::{ItemCode, StockEntryId, VoucherId, VoucherLineId, WarehouseCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::valuation::{BinState, FifoQueue};
use crate::voucher::VoucherType;

/// One valuation chain: an item in a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BinKey {
    /// The item.
    pub item: ItemCode,
    /// The warehouse.
    pub warehouse: WarehouseCode,
}

impl BinKey {
    /// Creates a bin key.
    #[must_use]
    pub fn new(item: impl Into<ItemCode>, warehouse: impl Into<WarehouseCode>) -> Self {
        Self {
            item: item.into(),
            warehouse: warehouse.into(),
        }
    }
}

impl std::fmt::Display for BinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.item, self.warehouse)
    }
}

/// Total order of entries inside a bin.
///
/// Entries sort by posting date-time, then by insertion sequence. The
/// sequence is assigned by the store on append and never changes, so entries
/// sharing a timestamp keep voucher creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostingKey {
    /// Posting date and time.
    pub posted_at: NaiveDateTime,
    /// Insertion sequence.
    pub sequence: u64,
}

impl PostingKey {
    /// Creates a posting key.
    #[must_use]
    pub const fn new(posted_at: NaiveDateTime, sequence: u64) -> Self {
        Self {
            posted_at,
            sequence,
        }
    }

    /// The smallest key at a posting date-time.
    #[must_use]
    pub const fn start_of(posted_at: NaiveDateTime) -> Self {
        Self::new(posted_at, 0)
    }
}

/// How the rate of a movement is derived whenever the entry is (re)valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum RateSource {
    /// Incoming at a fixed rate.
    Explicit(Decimal),
    /// Outgoing at the bin's valuation at that point.
    Valuation,
    /// Outgoing at the current incoming rate of the original receipt entry.
    ReturnAgainst(StockEntryId),
    /// Incoming with the value moved out by another entry.
    Linked(StockEntryId),
}

impl RateSource {
    /// Returns the entry this source reads its rate from, if any.
    #[must_use]
    pub fn depends_on(&self) -> Option<StockEntryId> {
        match self {
            Self::ReturnAgainst(id) | Self::Linked(id) => Some(*id),
            Self::Explicit(_) | Self::Valuation => None,
        }
    }
}

/// A movement to append to the store.
#[derive(Debug, Clone)]
pub struct NewStockEntry {
    /// The item.
    pub item: ItemCode,
    /// The warehouse.
    pub warehouse: WarehouseCode,
    /// Type of the originating voucher.
    pub voucher_type: VoucherType,
    /// The originating voucher.
    pub voucher_id: VoucherId,
    /// The originating voucher line.
    pub voucher_line_id: VoucherLineId,
    /// Posting date and time.
    pub posted_at: NaiveDateTime,
    /// Signed quantity delta.
    pub actual_qty: Decimal,
    /// Rate derivation.
    pub rate_source: RateSource,
    /// Whether a zero incoming rate is explicitly allowed.
    pub allow_zero_valuation_rate: bool,
}

/// A quantity movement in one bin with the valuation computed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    /// Unique identifier for this entry.
    pub id: StockEntryId,
    /// The item.
    pub item: ItemCode,
    /// The warehouse.
    pub warehouse: WarehouseCode,
    /// Type of the originating voucher.
    pub voucher_type: VoucherType,
    /// The originating voucher.
    pub voucher_id: VoucherId,
    /// The originating voucher line.
    pub voucher_line_id: VoucherLineId,
    /// Ordering key.
    pub posting: PostingKey,
    /// Signed quantity delta.
    pub actual_qty: Decimal,
    /// Rate derivation.
    pub rate_source: RateSource,
    /// Whether a zero incoming rate is explicitly allowed.
    pub allow_zero_valuation_rate: bool,
    /// Rate of an incoming movement.
    pub incoming_rate: Decimal,
    /// Rate of an outgoing movement.
    pub outgoing_rate: Decimal,
    /// Valuation rate after this movement.
    pub valuation_rate: Decimal,
    /// Bin quantity after this movement.
    pub qty_after_transaction: Decimal,
    /// Bin value after this movement.
    pub stock_value: Decimal,
    /// Signed change of bin value caused by this movement.
    pub stock_value_difference: Decimal,
    /// FIFO lots after this movement (empty for moving-average items).
    pub stock_queue: FifoQueue,
    /// Whether the voucher was cancelled.
    pub is_cancelled: bool,
    /// Whether this entry negates another on cancellation.
    pub is_reversal: bool,
}

impl StockLedgerEntry {
    /// Returns the bin this entry belongs to.
    #[must_use]
    pub fn key(&self) -> BinKey {
        BinKey::new(self.item.clone(), self.warehouse.clone())
    }

    /// Returns true if the entry takes part in valuation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_cancelled
    }

    /// Returns true for a receipt into the bin.
    #[must_use]
    pub fn is_incoming(&self) -> bool {
        self.actual_qty > Decimal::ZERO
    }

    /// Returns the bin state right after this entry.
    #[must_use]
    pub fn state_after(&self) -> BinState {
        BinState {
            qty: self.qty_after_transaction,
            value: self.stock_value,
            rate: self.valuation_rate,
            queue: self.stock_queue.clone(),
        }
    }

    /// Builds the reversing entry written on cancellation.
    #[must_use]
    pub fn reversal(&self, id: StockEntryId, sequence: u64) -> Self {
        Self {
            id,
            posting: PostingKey::new(self.posting.posted_at, sequence),
            actual_qty: -self.actual_qty,
            stock_value_difference: -self.stock_value_difference,
            is_cancelled: true,
            is_reversal: true,
            ..self.clone()
        }
    }
}
