//! Inventory posting.
//!
//! [`InventoryService`] is the public entry point. It stages each operation on
//! a copy of the [`LedgerBook`] and runs it through the posting pipeline:
//! validation, stock ledger entries, reposting and GL regeneration.

mod book;
mod item;
mod pipeline;
mod service;

pub use book::LedgerBook;
pub use item::Item;
pub use pipeline::{CancelOutcome, SubmitOutcome};
pub use service::InventoryService;
