//! Stock ledger.
//!
//! - Stock ledger entries and their ordering keys
//! - The per-bin entry store with cached balances
//! - Error types shared by the whole engine

pub mod cache;
pub mod entry;
pub mod error;
pub mod store;

pub use cache::BinCache;
pub use entry::{BinKey, NewStockEntry, PostingKey, RateSource, StockLedgerEntry};
pub use error::{StockError, StockResult};
pub use store::LedgerStore;
