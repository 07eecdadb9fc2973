//! Stock error types for validation, valuation, and consistency failures.
//!
//! None of these are caught and retried inside the engine. Every failure
//! propagates to the caller of submit/cancel/repost and leaves the book in its
//! prior state.

use chrono::NaiveDateTime;
use kardex_shared::types::{ItemCode, SerialNo, VoucherId, VoucherLineId, WarehouseCode};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using `StockError`.
pub type StockResult<T> = Result<T, StockError>;

/// Errors that can occur during stock operations.
#[derive(Debug, Error)]
pub enum StockError {
    // ========== Validation Errors ==========
    /// Generic document validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Received qty does not equal accepted plus rejected qty.
    #[error(
        "Received qty {received} for item {item} must equal accepted qty {accepted} plus rejected qty {rejected}"
    )]
    QtyMismatch {
        /// The item of the offending line.
        item: ItemCode,
        /// Received qty entered on the line.
        received: Decimal,
        /// Accepted qty on the line.
        accepted: Decimal,
        /// Rejected qty on the line.
        rejected: Decimal,
    },

    /// Primary qty is zero or negative where that is not allowed.
    #[error("Invalid qty {qty} for item {item}")]
    InvalidQty {
        /// The item of the offending line.
        item: ItemCode,
        /// The qty entered.
        qty: Decimal,
    },

    /// Serial number is already in stock.
    #[error("Serial No {serial} is already in stock in warehouse {warehouse}")]
    SerialNoDuplicate {
        /// The serial number.
        serial: SerialNo,
        /// Where it currently sits.
        warehouse: WarehouseCode,
    },

    /// Serial number is recorded in a transaction posted after this one.
    #[error("Serial No {serial} is used in a future transaction posted at {posted_at}")]
    SerialNoExistsInFutureTransaction {
        /// The serial number.
        serial: SerialNo,
        /// Posting of the later movement.
        posted_at: NaiveDateTime,
    },

    /// Serial number is not in the warehouse it is moved out of.
    #[error("Serial No {serial} is not available in warehouse {warehouse}")]
    SerialNoNotInWarehouse {
        /// The serial number.
        serial: SerialNo,
        /// The expected warehouse.
        warehouse: WarehouseCode,
    },

    /// Qty exceeds the reference qty plus the configured allowance.
    #[error(
        "Qty {attempted} for item {item} exceeds allowed qty {allowed} (allowance {allowance}%)"
    )]
    OverAllowance {
        /// The item of the offending line.
        item: ItemCode,
        /// Qty that would result.
        attempted: Decimal,
        /// Maximum qty permitted.
        allowed: Decimal,
        /// Allowance percentage applied.
        allowance: Decimal,
    },

    // ========== Valuation Errors ==========
    /// Bin would go below zero while negative stock is not allowed.
    #[error("Insufficient stock for item {item} in warehouse {warehouse} at {posted_at}: qty after transaction would be {qty_after}")]
    NegativeStock {
        /// The item.
        item: ItemCode,
        /// The warehouse.
        warehouse: WarehouseCode,
        /// Resulting qty.
        qty_after: Decimal,
        /// Posting of the movement.
        posted_at: NaiveDateTime,
    },

    /// Incoming movement at rate zero without allowance.
    #[error("Valuation rate for item {item} in warehouse {warehouse} is zero")]
    ZeroValuationRate {
        /// The item.
        item: ItemCode,
        /// The warehouse.
        warehouse: WarehouseCode,
    },

    // ========== Store Errors ==========
    /// The same (voucher, item, warehouse, line) was appended twice.
    #[error("Duplicate stock ledger entry for voucher {voucher}, item {item}, warehouse {warehouse}, line {line}")]
    DuplicateEntry {
        /// The voucher.
        voucher: VoucherId,
        /// The item.
        item: ItemCode,
        /// The warehouse.
        warehouse: WarehouseCode,
        /// The voucher line.
        line: VoucherLineId,
    },

    /// Recomputed ledger state violates an invariant.
    #[error("Ledger consistency error: {0}")]
    Consistency(String),

    /// A bin has repost work pending.
    #[error("Repost pending for item {item} in warehouse {warehouse}")]
    RepostPending {
        /// The item.
        item: ItemCode,
        /// The warehouse.
        warehouse: WarehouseCode,
    },

    // ========== Document Errors ==========
    /// Voucher not found.
    #[error("Voucher not found: {0}")]
    VoucherNotFound(VoucherId),

    /// Voucher line not found.
    #[error("Voucher line not found: {0}")]
    LineNotFound(VoucherLineId),

    /// Attempted an invalid status transition.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: String,
        /// The attempted target status.
        to: String,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StockError {
    /// Returns the error code for callers and logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::QtyMismatch { .. } => "QTY_MISMATCH",
            Self::InvalidQty { .. } => "INVALID_QTY",
            Self::SerialNoDuplicate { .. } => "SERIAL_NO_DUPLICATE",
            Self::SerialNoExistsInFutureTransaction { .. } => {
                "SERIAL_NO_EXISTS_IN_FUTURE_TRANSACTION"
            }
            Self::SerialNoNotInWarehouse { .. } => "SERIAL_NO_NOT_IN_WAREHOUSE",
            Self::OverAllowance { .. } => "OVER_ALLOWANCE",
            Self::NegativeStock { .. } => "NEGATIVE_STOCK",
            Self::ZeroValuationRate { .. } => "ZERO_VALUATION_RATE",
            Self::DuplicateEntry { .. } => "DUPLICATE_ENTRY",
            Self::Consistency(_) => "CONSISTENCY_ERROR",
            Self::RepostPending { .. } => "REPOST_PENDING",
            Self::VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            Self::LineNotFound(_) => "LINE_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the error is a rejection of the document itself.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::QtyMismatch { .. }
                | Self::InvalidQty { .. }
                | Self::SerialNoDuplicate { .. }
                | Self::SerialNoExistsInFutureTransaction { .. }
                | Self::SerialNoNotInWarehouse { .. }
                | Self::OverAllowance { .. }
                | Self::NegativeStock { .. }
                | Self::ZeroValuationRate { .. }
        )
    }

    /// Returns true if retrying the whole operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::RepostPending { .. })
    }
}
