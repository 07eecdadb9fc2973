//! Core engine for Kardex, a perpetual inventory ledger.
//!
//! Stock movements are recorded as immutable ledger entries per item and
//! warehouse, valued by FIFO or moving average, and mirrored into a
//! double-entry general ledger. Backdated postings, cancellations and landed
//! costs trigger a repost of every later entry they affect.
//!
//! # Modules
//!
//! - `stock` - Stock ledger entries and their store
//! - `valuation` - FIFO and moving-average valuation
//! - `repost` - Recomputing entries after backdated changes
//! - `ledger` - General ledger entries derived from stock movements
//! - `voucher` - Source documents, returns, billing and landed costs
//! - `serial` - Serial number tracking
//! - `inventory` - The service tying the stages together

pub mod inventory;
pub mod ledger;
pub mod repost;
pub mod serial;
pub mod stock;
pub mod valuation;
pub mod voucher;

pub use inventory::{CancelOutcome, InventoryService, Item, LedgerBook, SubmitOutcome};
